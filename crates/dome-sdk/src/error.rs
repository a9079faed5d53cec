//! SDK error types.
//!
//! Everything surfaced to callers renders with a `dome:` prefix so log lines
//! name the SDK that produced them.

use crate::registry::RegistryError;

/// Errors surfaced by the Dome SDK.
#[derive(Debug, thiserror::Error)]
pub enum DomeError {
    /// No authentication source resolved at construction.
    #[error("dome: authentication required (use credentials, api_key, DOME_AGENT_TOKEN, DOME_API_KEY, or DOME_TOKEN)")]
    MissingAuthentication,
    /// `start` was called without an agent name.
    #[error("dome: agent name is required")]
    MissingAgentName,
    /// A global-façade call before [`init`](crate::init).
    #[error("dome: client not initialized (call dome_sdk::init first)")]
    NotInitialized,
    /// The configured credentials file could not be read.
    #[error("dome: read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        source: std::io::Error,
    },
    /// Control-plane RPC failure.
    #[error("dome: {0}")]
    Registry(#[from] RegistryError),
    /// Credential exchange or transport failure.
    #[error("dome: {0}")]
    Auth(#[from] dome_auth::AuthError),
    /// Policy bundle fetch or compile failure.
    #[error("dome: {0}")]
    Policy(#[from] dome_policy::PolicyError),
}
