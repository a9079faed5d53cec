//! Policy engine and bundle fetch error types.

/// Errors from policy compilation, bundle fetch, and bundle load.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A bundle file failed to parse; the whole load is rejected.
    #[error("parse {filename}: {message}")]
    Compile { filename: String, message: String },
    /// Transport failure while fetching the bundle.
    #[error("fetch bundle: {0}")]
    Transport(#[from] dome_auth::AuthError),
    /// Reading the bundle body failed mid-stream.
    #[error("read bundle body: {0}")]
    Read(#[from] reqwest::Error),
    /// The bundle body exceeded the size cap.
    #[error("bundle body exceeds {limit} bytes")]
    BundleTooLarge { limit: usize },
    /// The bundle body was not valid JSON.
    #[error("decode bundle: {0}")]
    Decode(#[from] serde_json::Error),
    /// The bundle API returned a status other than 200/304/404.
    #[error("unexpected status {status} from policy bundle API")]
    UnexpectedStatus { status: u16 },
}
