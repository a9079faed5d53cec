//! Token exchange via the Dome API server.
//!
//! AppRole credentials are exchanged for a JWT at
//! `POST {api_url}/api/v1/auth/token`; the agent never talks to Vault. The
//! JWT is cached and refreshed 30 seconds before expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::{AuthError, AuthEvent, AuthEventHook, TokenSource};

/// Refresh the cached JWT this long before it expires.
const EXPIRY_BUFFER: Duration = Duration::from_secs(30);

/// Configuration for the token-exchange strategy, extracted from the
/// credential blob.
#[derive(Clone)]
pub struct TokenExchangeConfig {
    /// Dome API server URL (e.g. `https://api.dome.example.com`).
    pub api_url: String,
    /// AppRole `role_id` from the credential blob.
    pub role_id: String,
    /// AppRole `secret_id` from the credential blob.
    pub secret_id: Zeroizing<String>,
}

impl std::fmt::Debug for TokenExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeConfig")
            .field("api_url", &self.api_url)
            .field("role_id", &self.role_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

#[derive(Default)]
struct CachedToken {
    token: String,
    expiry: Option<Instant>,
}

impl CachedToken {
    fn valid(&self, buffer: Duration) -> bool {
        match self.expiry {
            Some(expiry) => !self.token.is_empty() && Instant::now() + buffer < expiry,
            None => false,
        }
    }
}

/// [`TokenSource`] implementing the token-exchange strategy.
pub struct TokenExchange {
    http: reqwest::Client,
    config: TokenExchangeConfig,
    cache: Mutex<CachedToken>,
    hook: Option<AuthEventHook>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl TokenExchange {
    pub fn new(
        http: reqwest::Client,
        config: TokenExchangeConfig,
        hook: Option<AuthEventHook>,
    ) -> Self {
        Self {
            http,
            config,
            cache: Mutex::new(CachedToken::default()),
            hook,
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/api/v1/auth/token",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }

    /// Exchange AppRole credentials for a fresh JWT.
    async fn exchange(&self) -> Result<(String, u64), AuthError> {
        let endpoint = self.token_endpoint();
        let body = serde_json::json!({
            "grant_type": "approle",
            "role_id": self.config.role_id,
            "secret_id": self.config.secret_id.as_str(),
        });

        let resp = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| AuthError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            resp.json()
                .await
                .map_err(|source| AuthError::Deserialization {
                    endpoint: endpoint.clone(),
                    source,
                })?;

        if parsed.access_token.is_empty() {
            return Err(AuthError::MissingField {
                endpoint,
                field: "access_token",
            });
        }

        tracing::debug!(expires_in = parsed.expires_in, "exchanged credentials for bearer token");
        Ok((parsed.access_token, parsed.expires_in))
    }
}

#[async_trait]
impl TokenSource for TokenExchange {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        let mut cache = self.cache.lock().await;

        if cache.valid(EXPIRY_BUFFER) {
            return Ok(cache.token.clone());
        }

        // Holding the lock across the exchange serializes concurrent first
        // use; later callers observe the refreshed token.
        match self.exchange().await {
            Ok((token, expires_in)) => {
                cache.token = token.clone();
                cache.expiry = Some(Instant::now() + Duration::from_secs(expires_in));
                self.emit(AuthEvent::Authenticated);
                Ok(token)
            }
            Err(err) => {
                self.emit(AuthEvent::AuthFailed);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchange")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
