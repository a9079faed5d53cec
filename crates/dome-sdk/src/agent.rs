//! Agent announcement and the registration state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use dome_policy::AgentContext;

use crate::client::{Client, ClientInner, Worker};
use crate::registry::{Agent, RegistryError};
use crate::retry::retry_with_backoff;
use crate::DomeError;

const REGISTRATION_RETRY_BASE: Duration = Duration::from_secs(5);
const REGISTRATION_RETRY_MAX: Duration = Duration::from_secs(120);

/// Configures the agent announcement to the control plane.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Agent name, unique within the tenant. Required.
    pub name: String,
    pub description: String,
    pub parent_id: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Default)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub token: String,
}

impl AgentInfo {
    fn from_agent(agent: Agent, token: String) -> Self {
        Self {
            id: agent.id,
            name: agent.name,
            status: agent.status,
            capabilities: agent.capabilities,
            metadata: agent.metadata,
            token,
        }
    }
}

impl Client {
    /// Announce the agent to the Dome control plane and begin background
    /// heartbeat.
    ///
    /// If an agent with the same name already exists, `start` finds it and
    /// adopts its identity, so calling `start` on every startup is safe.
    ///
    /// With graceful degradation enabled, a failed announcement logs a
    /// warning and retries in the background instead of returning an error;
    /// [`agent_id`](Client::agent_id) stays empty until the background
    /// registration succeeds.
    pub async fn start(&self, opts: StartOptions) -> Result<AgentInfo, DomeError> {
        if opts.name.is_empty() {
            return Err(DomeError::MissingAgentName);
        }

        let inner = &self.inner;
        let info = match inner.do_register(&opts).await {
            Ok(info) => info,
            Err(err) if inner.config.graceful_degradation => {
                warn!(
                    agent_name = %opts.name,
                    error = %err,
                    "registration failed, retrying in background"
                );
                let placeholder = AgentInfo {
                    name: opts.name.clone(),
                    ..Default::default()
                };
                inner.clone().start_background_registration(opts).await;
                if !inner.config.disable_policy {
                    inner.start_policy_syncer().await;
                }
                return Ok(placeholder);
            }
            Err(err) => return Err(err),
        };

        inner.adopt_identity(&info).await;

        if !inner.config.disable_heartbeat {
            inner.clone().start_heartbeat(info.id.clone()).await;
        }
        if !inner.config.disable_policy {
            inner.start_policy_syncer().await;
        }

        Ok(info)
    }
}

impl ClientInner {
    /// One registration attempt, with the duplicate-name fallthrough that
    /// makes registration idempotent.
    pub(crate) async fn do_register(&self, opts: &StartOptions) -> Result<AgentInfo, DomeError> {
        let parent_id = (!opts.parent_id.is_empty()).then_some(opts.parent_id.as_str());
        let description = (!opts.description.is_empty()).then_some(opts.description.as_str());

        match self
            .registry
            .register_agent(
                &opts.name,
                &opts.capabilities,
                &opts.metadata,
                parent_id,
                description,
            )
            .await
        {
            Ok(resp) => {
                let agent = resp.agent.unwrap_or_default();
                Ok(AgentInfo::from_agent(agent, resp.token))
            }
            Err(RegistryError::AlreadyExists) => self.find_existing_agent(&opts.name).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Look up an existing agent by name via `ListAgents`.
    async fn find_existing_agent(&self, name: &str) -> Result<AgentInfo, DomeError> {
        let resp = self.registry.list_agents(100).await?;

        resp.agents
            .into_iter()
            .find(|a| a.name == name)
            .map(|agent| AgentInfo::from_agent(agent, String::new()))
            .ok_or_else(|| {
                DomeError::Registry(RegistryError::ExistingAgentNotFound {
                    name: name.to_string(),
                })
            })
    }

    /// Record the registered identity: refresh the policy principal, publish
    /// the agent id (draining queued auth events), and emit `agent.started`.
    pub(crate) async fn adopt_identity(&self, info: &AgentInfo) {
        {
            let mut ctx = self.agent_ctx.lock();
            *ctx = AgentContext {
                id: info.id.clone(),
                capabilities: info.capabilities.clone(),
                ..AgentContext::default()
            };
        }
        self.events.set_agent_id(&info.id);
        self.report_event_logged(&info.id, "agent.started").await;
    }

    /// Spawn the background registration worker. On success the same worker
    /// falls through into the heartbeat loop; starting heartbeat through
    /// [`start_heartbeat`](ClientInner::start_heartbeat) from inside the
    /// worker would cancel and wait on itself.
    pub(crate) async fn start_background_registration(self: Arc<Self>, opts: StartOptions) {
        let mut state = self.state.lock().await;

        if let Some(old) = state.worker.take() {
            old.cancel.cancel();
            let _ = old.handle.await;
        }

        let cancel = tokio_util::sync::CancellationToken::new();
        let worker_cancel = cancel.clone();
        let inner = self.clone();

        let handle = tokio::spawn(async move {
            let registered = retry_with_backoff(
                &worker_cancel,
                REGISTRATION_RETRY_BASE,
                REGISTRATION_RETRY_MAX,
                || {
                    let inner = inner.clone();
                    let opts = opts.clone();
                    async move {
                        inner.do_register(&opts).await.map_err(|err| {
                            debug!(
                                agent_name = %opts.name,
                                error = %err,
                                "background registration retry failed"
                            );
                        })
                    }
                },
            )
            .await;

            let Ok(info) = registered else {
                debug!("background registration canceled");
                return;
            };

            info!(
                agent_id = %info.id,
                agent_name = %info.name,
                "background registration succeeded"
            );
            inner.adopt_identity(&info).await;

            if !inner.config.disable_heartbeat {
                inner.run_heartbeat(&worker_cancel, &info.id).await;
            }
        });

        state.worker = Some(Worker { cancel, handle });
    }
}
