//! Typed client for the control plane's agent registry.
//!
//! The registry speaks a Connect-style JSON protocol: every operation is a
//! `POST {base}/dome.agent.v1.AgentRegistry/{Method}` with a JSON body.
//! Non-2xx responses carry `{code, message}`; `code == "already_exists"` is
//! the distinguished duplicate-name outcome that makes registration
//! idempotent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use dome_auth::{AuthError, AuthTransport};

const SERVICE_PATH: &str = "dome.agent.v1.AgentRegistry";

/// Errors from agent registry RPCs.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Transport or credential-exchange failure.
    #[error("{0}")]
    Transport(#[from] AuthError),
    /// The registry returned a non-2xx status.
    #[error("agent registry {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// An agent with the requested name is already registered.
    #[error("an agent with this name already exists")]
    AlreadyExists,
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The duplicate-name listing did not contain the expected agent.
    #[error("agent {name:?} already exists but could not be found")]
    ExistingAgentNotFound { name: String },
}

/// Agent record as returned by the registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Agent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterAgentRequest {
    name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    capabilities: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterAgentResponse {
    #[serde(default)]
    pub agent: Option<Agent>,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
struct ListAgentsRequest {
    limit: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListAgentsResponse {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    #[allow(dead_code)]
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest<'a> {
    agent_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportEventRequest<'a> {
    agent_id: &'a str,
    event_type: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
}

/// Agent registry RPC client over the shared authenticated transport.
pub(crate) struct RegistryClient {
    transport: AuthTransport,
    base_url: String,
}

impl RegistryClient {
    pub fn new(transport: AuthTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    pub async fn register_agent(
        &self,
        name: &str,
        capabilities: &[String],
        metadata: &HashMap<String, String>,
        parent_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<RegisterAgentResponse, RegistryError> {
        self.call(
            "RegisterAgent",
            &RegisterAgentRequest {
                name: name.to_string(),
                capabilities: capabilities.to_vec(),
                metadata: metadata.clone(),
                parent_id: parent_id.map(str::to_string),
                description: description.map(str::to_string),
            },
        )
        .await
    }

    pub async fn list_agents(&self, limit: u32) -> Result<ListAgentsResponse, RegistryError> {
        self.call("ListAgents", &ListAgentsRequest { limit }).await
    }

    pub async fn heartbeat(&self, agent_id: &str) -> Result<(), RegistryError> {
        self.call::<_, Empty>("Heartbeat", &HeartbeatRequest { agent_id })
            .await?;
        Ok(())
    }

    pub async fn report_event(&self, agent_id: &str, event_type: &str) -> Result<(), RegistryError> {
        self.call::<_, Empty>(
            "ReportEvent",
            &ReportEventRequest {
                agent_id,
                event_type,
                timestamp: Utc::now(),
            },
        )
        .await?;
        Ok(())
    }

    async fn call<Req, Resp>(&self, rpc: &str, body: &Req) -> Result<Resp, RegistryError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let endpoint = format!(
            "{}/{SERVICE_PATH}/{rpc}",
            self.base_url.trim_end_matches('/')
        );

        let request = self
            .transport
            .http()
            .post(&endpoint)
            .json(body)
            .build()
            .map_err(|source| AuthError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let resp = self.transport.execute(request).await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
                if parsed.code == "already_exists" {
                    return Err(RegistryError::AlreadyExists);
                }
            }
            return Err(RegistryError::Api {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|source| RegistryError::Deserialization { endpoint, source })
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
