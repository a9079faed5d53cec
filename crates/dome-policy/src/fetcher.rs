//! Policy bundle fetch with conditional-request caching.
//!
//! Bundles come from `GET {base}/api/v1/policies/bundle` over the shared
//! authenticated transport. The fetcher remembers the last `ETag` and sends
//! `If-None-Match`, so an unchanged bundle costs one 304 round trip.

use parking_lot::Mutex;
use serde::Deserialize;

use dome_auth::AuthTransport;

use crate::PolicyError;

/// Refuse bundle bodies larger than this.
const MAX_BUNDLE_BYTES: usize = 50 << 20;

/// Response shape of `GET /api/v1/policies/bundle`.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleResponse {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub policies: Vec<PolicyFile>,
}

/// A single Cedar policy file within a bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyFile {
    pub filename: String,
    pub content: String,
}

/// Result of a bundle fetch.
#[derive(Debug)]
pub struct FetchResult {
    pub bundle: Option<BundleResponse>,
    /// `false` when the server answered 304 Not Modified or 404 Not Found.
    pub changed: bool,
}

/// Retrieves policy bundles from the Dome API server.
#[derive(Debug)]
pub struct Fetcher {
    transport: AuthTransport,
    base_url: String,
    tenant_id: String,
    etag: Mutex<Option<String>>,
}

impl Fetcher {
    pub fn new(transport: AuthTransport, base_url: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            tenant_id: tenant_id.into(),
            etag: Mutex::new(None),
        }
    }

    /// Fetch the latest bundle. Returns `changed: false` on 304 (ETag match)
    /// and on 404 (no bundle provisioned for the tenant).
    pub async fn fetch(&self) -> Result<FetchResult, PolicyError> {
        let url = format!(
            "{}/api/v1/policies/bundle",
            self.base_url.trim_end_matches('/')
        );

        let mut builder = self
            .transport
            .http()
            .get(&url)
            .header("X-Tenant-ID", &self.tenant_id);
        if let Some(etag) = self.etag.lock().clone() {
            builder = builder.header("If-None-Match", etag);
        }
        let req = builder.build()?;

        let resp = self.transport.execute(req).await?;

        match resp.status().as_u16() {
            304 => Ok(FetchResult {
                bundle: None,
                changed: false,
            }),
            // No bundle for this tenant yet; not an error.
            404 => Ok(FetchResult {
                bundle: None,
                changed: false,
            }),
            200 => {
                let etag = resp
                    .headers()
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                let body = read_bounded(resp).await?;
                let bundle: BundleResponse = serde_json::from_slice(&body)?;

                if let Some(etag) = etag {
                    *self.etag.lock() = Some(etag);
                }

                Ok(FetchResult {
                    bundle: Some(bundle),
                    changed: true,
                })
            }
            status => Err(PolicyError::UnexpectedStatus { status }),
        }
    }
}

async fn read_bounded(mut resp: reqwest::Response) -> Result<Vec<u8>, PolicyError> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > MAX_BUNDLE_BYTES {
            return Err(PolicyError::BundleTooLarge {
                limit: MAX_BUNDLE_BYTES,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
