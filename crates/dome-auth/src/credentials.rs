//! Credential-blob decoding.
//!
//! Agents are issued an opaque token by `dome agents register`. When that
//! token is base64-encoded JSON carrying exchange configuration, the SDK
//! decodes it and picks an exchange strategy; otherwise the token is used
//! verbatim as a bearer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

/// Exchange configuration issued to an agent.
///
/// Consumers never construct this directly. They pass the opaque blob from
/// `dome agents register` and the SDK decodes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentCredentials {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub vault_addr: String,
    #[serde(default)]
    pub auth_method: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub kube_auth_role: String,
    #[serde(default)]
    pub oidc_role_name: String,
}

/// Decode a credential blob into [`AgentCredentials`].
///
/// Returns `None` when the blob is empty, not valid base64, not JSON, or
/// decodes to JSON without either distinguishing field (`api_url`,
/// `vault_addr`) -- all of which mean the blob should be treated as a plain
/// bearer token.
pub fn decode_credential_blob(blob: &str) -> Option<AgentCredentials> {
    let blob = blob.trim();
    if blob.is_empty() {
        return None;
    }

    let data = BASE64.decode(blob).ok()?;
    let creds: AgentCredentials = serde_json::from_slice(&data).ok()?;

    if creds.api_url.is_empty() && creds.vault_addr.is_empty() {
        return None;
    }

    Some(creds)
}
