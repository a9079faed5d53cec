//! # dome-auth -- Authenticated HTTP transport for the Dome SDK
//!
//! Every outgoing control-plane call carries a short-lived bearer token. This
//! crate resolves the configured credentials into one of three token
//! strategies and wraps a [`reqwest::Client`] so per-request code stays
//! identical regardless of strategy:
//!
//! - [`StaticToken`] -- a plain API key injected verbatim.
//! - [`TokenExchange`] -- AppRole credentials exchanged for a JWT via the Dome
//!   API server (`POST /api/v1/auth/token`), cached until shortly before
//!   expiry.
//! - [`VaultIdentity`] -- two-step Vault auth: login (AppRole or Kubernetes)
//!   for a primary token, then an identity OIDC token minted from it. Both
//!   steps are cached.
//!
//! Strategy selection happens once, at client construction, from the decoded
//! credential blob (see [`credentials::decode_credential_blob`]).

pub mod credentials;
pub mod error;
mod exchange;
mod vault;

pub use credentials::{decode_credential_blob, AgentCredentials};
pub use error::AuthError;
pub use exchange::{TokenExchange, TokenExchangeConfig};
pub use vault::{VaultIdentity, VaultIdentityConfig, VaultLogin, DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use zeroize::Zeroizing;

/// Auth lifecycle events emitted by the exchanging strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A token acquisition succeeded.
    Authenticated,
    /// A token acquisition failed.
    AuthFailed,
}

impl AuthEvent {
    /// The control-plane event type for this auth event.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthEvent::Authenticated => "agent.authenticated",
            AuthEvent::AuthFailed => "agent.auth_failed",
        }
    }
}

/// Callback invoked on auth lifecycle events. Outcomes are ignored; the hook
/// must not block.
pub type AuthEventHook = Arc<dyn Fn(AuthEvent) + Send + Sync>;

/// A source of bearer tokens for outgoing requests.
///
/// Implementations cache aggressively: [`bearer_token`](TokenSource::bearer_token)
/// is called before every request and must be cheap on the hot path.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a bearer token valid for at least the next request.
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// A static bearer token (API key or opaque issued token).
pub struct StaticToken {
    token: Zeroizing<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.token.to_string())
    }
}

/// Authenticated HTTP transport shared by the control-plane RPC client and
/// the policy bundle fetcher.
///
/// [`execute`](AuthTransport::execute) injects `Authorization: Bearer …` on
/// any request that does not already carry the header. Token acquisition
/// happens through the configured [`TokenSource`]; exchange round trips use
/// the source's own bare client, so they are structurally exempt from
/// injection.
#[derive(Clone)]
pub struct AuthTransport {
    http: reqwest::Client,
    source: Arc<dyn TokenSource>,
}

impl AuthTransport {
    pub fn new(http: reqwest::Client, source: Arc<dyn TokenSource>) -> Self {
        Self { http, source }
    }

    /// The underlying client, for building requests to execute through this
    /// transport.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Execute a request, injecting a bearer token unless the request
    /// already carries an `Authorization` header.
    pub async fn execute(&self, mut req: reqwest::Request) -> Result<reqwest::Response, AuthError> {
        if !req.headers().contains_key(AUTHORIZATION) {
            let token = self.source.bearer_token().await?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AuthError::InvalidToken)?;
            req.headers_mut().insert(AUTHORIZATION, value);
        }

        let endpoint = req.url().path().to_string();
        self.http
            .execute(req)
            .await
            .map_err(|source| AuthError::Http { endpoint, source })
    }
}

impl std::fmt::Debug for AuthTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTransport").finish_non_exhaustive()
    }
}
