//! The Dome SDK client.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dome_auth::{
    decode_credential_blob, AuthEventHook, AuthTransport, StaticToken, TokenExchange,
    TokenExchangeConfig, TokenSource, VaultIdentity, VaultIdentityConfig, VaultLogin,
    DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH,
};
use dome_policy::{AgentContext, Engine, Fetcher, Syncer};
use zeroize::Zeroizing;

use crate::config::ClientConfig;
use crate::events::EventHub;
use crate::registry::RegistryClient;
use crate::DomeError;

/// A background registration-or-heartbeat worker. At most one exists; the
/// join handle doubles as the completion signal awaited on replacement and
/// close.
#[derive(Debug)]
pub(crate) struct Worker {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(crate) struct ClientState {
    pub tenant_id: String,
    pub worker: Option<Worker>,
    pub syncer: Option<Syncer>,
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    pub config: ClientConfig,
    pub transport: AuthTransport,
    pub registry: Arc<RegistryClient>,
    pub engine: Arc<Engine>,
    pub events: Arc<EventHub>,
    /// Principal attributes for policy evaluation, refreshed on
    /// registration. Never held across await points.
    pub agent_ctx: Mutex<AgentContext>,
    pub state: tokio::sync::Mutex<ClientState>,
}

/// The Dome SDK client. Handles agent registration, heartbeat, and local
/// Cedar policy evaluation. Create one with [`Client::builder`], or use the
/// global [`init`](crate::init)/[`shutdown`](crate::shutdown) functions.
///
/// Cloning is cheap and clones share all state.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Start building a client.
    pub fn builder() -> crate::ClientBuilder {
        crate::ClientBuilder::new()
    }

    pub(crate) fn from_config(config: ClientConfig) -> Result<Self, DomeError> {
        let engine = Arc::new(Engine::new());
        let events = Arc::new(EventHub::new());

        let hook: AuthEventHook = {
            let events = events.clone();
            Arc::new(move |event| events.auth_event(event.as_str()))
        };

        let http = reqwest::Client::new();
        let source = resolve_token_source(&config, http.clone(), hook)?;
        let transport = AuthTransport::new(http, source);

        let registry = Arc::new(RegistryClient::new(transport.clone(), config.api_url.clone()));
        events.set_registry(registry.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                registry,
                engine,
                events,
                agent_ctx: Mutex::new(AgentContext::default()),
                state: tokio::sync::Mutex::new(ClientState::default()),
            }),
        })
    }

    /// The registered agent's id, or empty if not yet registered.
    pub fn agent_id(&self) -> String {
        self.inner.events.agent_id().unwrap_or_default()
    }

    /// Stop the background worker and policy syncer and release resources.
    /// Safe to call multiple times; later calls are no-ops.
    pub async fn close(&self) -> Result<(), DomeError> {
        let mut state = self.inner.state.lock().await;

        if let Some(mut syncer) = state.syncer.take() {
            syncer.stop().await;
        }

        // Emit agent.stopped before tearing down the worker. Best-effort.
        if let Some(agent_id) = self.inner.events.agent_id() {
            self.inner
                .report_event_logged(&agent_id, "agent.stopped")
                .await;
        }

        if let Some(worker) = state.worker.take() {
            worker.cancel.cancel();
            let _ = worker.handle.await;
        }

        self.inner.events.clear_agent_id();
        Ok(())
    }
}

impl ClientInner {
    /// Send a lifecycle event, logging failures instead of surfacing them.
    pub(crate) async fn report_event_logged(&self, agent_id: &str, event_type: &str) {
        if agent_id.is_empty() {
            return;
        }
        if let Err(err) = self.registry.report_event(agent_id, event_type).await {
            debug!(%agent_id, %event_type, error = %err, "failed to report event");
        }
    }

    /// Begin periodic policy bundle sync. The first fetch runs before this
    /// returns; failures there are logged, not fatal.
    pub(crate) async fn start_policy_syncer(&self) {
        let mut state = self.state.lock().await;
        if state.syncer.is_some() {
            return;
        }

        // The control plane derives the tenant from the auth token; the
        // header value is advisory.
        let fetcher = Fetcher::new(
            self.transport.clone(),
            self.config.api_url.clone(),
            state.tenant_id.clone(),
        );
        let mut syncer = Syncer::new(
            fetcher,
            self.engine.clone(),
            self.config.policy_refresh_interval,
        );
        syncer.start().await;
        state.syncer = Some(syncer);
    }
}

fn resolve_token_source(
    config: &ClientConfig,
    http: reqwest::Client,
    hook: AuthEventHook,
) -> Result<Arc<dyn TokenSource>, DomeError> {
    let blob = resolve_credential_blob(config)?;

    if let Some(blob) = blob {
        if let Some(creds) = decode_credential_blob(&blob) {
            if !creds.api_url.is_empty() && creds.auth_method == "approle" {
                // Token exchange via the Dome API: the agent never talks to
                // Vault directly.
                return Ok(Arc::new(TokenExchange::new(
                    http,
                    TokenExchangeConfig {
                        api_url: creds.api_url,
                        role_id: creds.role_id,
                        secret_id: Zeroizing::new(creds.secret_id),
                    },
                    Some(hook),
                )));
            }

            if !creds.vault_addr.is_empty() && !creds.oidc_role_name.is_empty() {
                let login = match creds.auth_method.as_str() {
                    "kubernetes" => VaultLogin::Kubernetes {
                        role: creds.kube_auth_role,
                        token_path: DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.into(),
                    },
                    _ => VaultLogin::AppRole {
                        role_id: creds.role_id,
                        secret_id: Zeroizing::new(creds.secret_id),
                    },
                };
                return Ok(Arc::new(VaultIdentity::new(
                    http,
                    VaultIdentityConfig {
                        vault_addr: creds.vault_addr,
                        oidc_role: creds.oidc_role_name,
                        login,
                    },
                    Some(hook),
                )));
            }
        }

        // A blob that decodes to nothing exchange-capable is an opaque
        // bearer token.
        return Ok(Arc::new(StaticToken::new(blob.to_string())));
    }

    if let Some(key) = &config.api_key {
        return Ok(Arc::new(StaticToken::new(key.to_string())));
    }
    if let Ok(key) = std::env::var("DOME_API_KEY") {
        if !key.is_empty() {
            return Ok(Arc::new(StaticToken::new(key)));
        }
    }
    if let Ok(key) = std::env::var("DOME_TOKEN") {
        if !key.is_empty() {
            return Ok(Arc::new(StaticToken::new(key)));
        }
    }

    Err(DomeError::MissingAuthentication)
}

fn resolve_credential_blob(config: &ClientConfig) -> Result<Option<Zeroizing<String>>, DomeError> {
    if let Some(blob) = &config.credentials {
        return Ok(Some(blob.clone()));
    }
    if let Some(path) = &config.credentials_file {
        let contents =
            std::fs::read_to_string(path).map_err(|source| DomeError::CredentialsFile {
                path: path.display().to_string(),
                source,
            })?;
        return Ok(Some(Zeroizing::new(contents)));
    }
    if let Ok(blob) = std::env::var("DOME_AGENT_TOKEN") {
        if !blob.is_empty() {
            return Ok(Some(Zeroizing::new(blob)));
        }
    }
    Ok(None)
}
