//! Vault-based two-step identity auth.
//!
//! Legacy deployments authenticate directly against Vault: a login (AppRole
//! or Kubernetes service account) yields a primary client token, which then
//! mints a signed identity OIDC token from
//! `GET {vault_addr}/v1/identity/oidc/token/{role}`. The OIDC token is the
//! bearer injected into outgoing requests. Both tokens are cached; the
//! primary keeps a wider refresh buffer so the OIDC mint never runs against
//! a token about to lapse.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::{AuthError, AuthEvent, AuthEventHook, TokenSource};

/// Refresh the OIDC bearer this long before expiry.
const OIDC_EXPIRY_BUFFER: Duration = Duration::from_secs(30);

/// Refresh the primary Vault token this long before expiry.
const PRIMARY_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default location of the Kubernetes service-account JWT.
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Vault login method for acquiring the primary client token.
#[derive(Clone)]
pub enum VaultLogin {
    AppRole {
        role_id: String,
        secret_id: Zeroizing<String>,
    },
    Kubernetes {
        role: String,
        /// Path to the service-account JWT; overridable for tests.
        token_path: PathBuf,
    },
}

impl std::fmt::Debug for VaultLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultLogin::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"[REDACTED]")
                .finish(),
            VaultLogin::Kubernetes { role, token_path } => f
                .debug_struct("Kubernetes")
                .field("role", role)
                .field("token_path", token_path)
                .finish(),
        }
    }
}

/// Configuration for the Vault identity strategy.
#[derive(Debug, Clone)]
pub struct VaultIdentityConfig {
    /// Vault server address.
    pub vault_addr: String,
    /// Identity OIDC role minting the final bearer.
    pub oidc_role: String,
    /// Login method for the primary token.
    pub login: VaultLogin,
}

#[derive(Default)]
struct VaultState {
    oidc_token: String,
    oidc_expiry: Option<Instant>,
    primary_token: String,
    primary_expiry: Option<Instant>,
}

impl VaultState {
    fn oidc_valid(&self) -> bool {
        matches!(self.oidc_expiry, Some(e) if !self.oidc_token.is_empty()
            && Instant::now() + OIDC_EXPIRY_BUFFER < e)
    }

    fn primary_valid(&self) -> bool {
        matches!(self.primary_expiry, Some(e) if !self.primary_token.is_empty()
            && Instant::now() + PRIMARY_EXPIRY_BUFFER < e)
    }
}

/// [`TokenSource`] implementing the two-step Vault identity strategy.
pub struct VaultIdentity {
    http: reqwest::Client,
    config: VaultIdentityConfig,
    state: Mutex<VaultState>,
    hook: Option<AuthEventHook>,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    auth: LoginAuth,
}

#[derive(Default, Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Deserialize)]
struct OidcResponse {
    #[serde(default)]
    data: OidcData,
}

#[derive(Default, Deserialize)]
struct OidcData {
    #[serde(default)]
    token: String,
    #[serde(default)]
    ttl: u64,
}

impl VaultIdentity {
    pub fn new(
        http: reqwest::Client,
        config: VaultIdentityConfig,
        hook: Option<AuthEventHook>,
    ) -> Self {
        Self {
            http,
            config,
            state: Mutex::new(VaultState::default()),
            hook,
        }
    }

    fn vault_url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.vault_addr.trim_end_matches('/'))
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }

    /// Login to Vault and return `(client_token, lease_duration)`.
    async fn login(&self) -> Result<(String, u64), AuthError> {
        let (path, body) = match &self.config.login {
            VaultLogin::AppRole { role_id, secret_id } => (
                "auth/approle/login",
                serde_json::json!({"role_id": role_id, "secret_id": secret_id.as_str()}),
            ),
            VaultLogin::Kubernetes { role, token_path } => {
                let jwt = tokio::fs::read_to_string(token_path).await.map_err(|source| {
                    AuthError::ServiceAccountToken {
                        path: token_path.display().to_string(),
                        source,
                    }
                })?;
                (
                    "auth/kubernetes/login",
                    serde_json::json!({"role": role, "jwt": jwt.trim()}),
                )
            }
        };

        let endpoint = self.vault_url(path);
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
            return Err(AuthError::VaultLogin {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: LoginResponse =
            resp.json()
                .await
                .map_err(|source| AuthError::Deserialization {
                    endpoint: endpoint.clone(),
                    source,
                })?;

        if parsed.auth.client_token.is_empty() {
            return Err(AuthError::MissingField {
                endpoint,
                field: "client_token",
            });
        }

        tracing::debug!(lease_duration = parsed.auth.lease_duration, "vault login succeeded");
        Ok((parsed.auth.client_token, parsed.auth.lease_duration))
    }

    /// Mint an identity OIDC token using the primary token.
    async fn mint_oidc(&self, primary_token: &str) -> Result<(String, u64), AuthError> {
        let endpoint = self.vault_url(&format!("identity/oidc/token/{}", self.config.oidc_role));

        let resp = self
            .http
            .get(&endpoint)
            .header("X-Vault-Token", primary_token)
            .send()
            .await
            .map_err(|source| AuthError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::VaultIdentity {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OidcResponse =
            resp.json()
                .await
                .map_err(|source| AuthError::Deserialization {
                    endpoint: endpoint.clone(),
                    source,
                })?;

        if parsed.data.token.is_empty() {
            return Err(AuthError::MissingField {
                endpoint,
                field: "token",
            });
        }

        Ok((parsed.data.token, parsed.data.ttl))
    }

    async fn acquire(&self, state: &mut VaultState) -> Result<String, AuthError> {
        if !state.primary_valid() {
            let (token, lease) = self.login().await?;
            state.primary_token = token;
            state.primary_expiry = Some(Instant::now() + Duration::from_secs(lease));
        }

        let (token, ttl) = self.mint_oidc(&state.primary_token).await?;
        state.oidc_token = token.clone();
        state.oidc_expiry = Some(Instant::now() + Duration::from_secs(ttl));
        Ok(token)
    }
}

#[async_trait]
impl TokenSource for VaultIdentity {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;

        if state.oidc_valid() {
            return Ok(state.oidc_token.clone());
        }

        match self.acquire(&mut state).await {
            Ok(token) => {
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

impl std::fmt::Debug for VaultIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultIdentity")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
