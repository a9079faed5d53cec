//! Auth transport error types.

/// Errors from credential exchange and authenticated request dispatch.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The token exchange endpoint returned a non-200 status.
    #[error("token exchange failed (HTTP {status}): {body}")]
    Exchange { status: u16, body: String },
    /// Vault login returned a non-200 status.
    #[error("vault login failed (HTTP {status}): {body}")]
    VaultLogin { status: u16, body: String },
    /// Vault identity token endpoint returned a non-200 status.
    #[error("vault identity token failed (HTTP {status}): {body}")]
    VaultIdentity { status: u16, body: String },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// A required field was absent from an otherwise valid response.
    #[error("{endpoint} response missing {field}")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },
    /// The Kubernetes service-account token file could not be read.
    #[error("read service account token {path}: {source}")]
    ServiceAccountToken {
        path: String,
        source: std::io::Error,
    },
    /// An acquired token is not a valid HTTP header value.
    #[error("acquired token is not a valid header value")]
    InvalidToken,
}
