//! Lifecycle event reporting and the pending-event queue.
//!
//! The credential transport can emit `agent.authenticated` during the very
//! first token fetch -- before registration has assigned an agent id. Those
//! events are queued here and drained, in order, once the id arrives.
//! Everything dispatched from this module is fire-and-forget: failures are
//! logged at debug level and never surface.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::registry::RegistryClient;

#[derive(Debug, Default)]
struct EventHubState {
    agent_id: Option<String>,
    pending: Vec<String>,
    registry: Option<Arc<RegistryClient>>,
}

/// Routes lifecycle events to the control plane, buffering events produced
/// before an agent id exists.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    state: Mutex<EventHubState>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the registry client after construction. Events observed before
    /// this are held in the pending queue.
    pub fn set_registry(&self, registry: Arc<RegistryClient>) {
        self.state.lock().registry = Some(registry);
    }

    /// The registered agent id, if any.
    pub fn agent_id(&self) -> Option<String> {
        self.state.lock().agent_id.clone()
    }

    /// Record an auth lifecycle event. Dispatched immediately when the agent
    /// id is known, queued otherwise.
    pub fn auth_event(&self, event_type: &str) {
        let mut state = self.state.lock();
        match (state.agent_id.clone(), state.registry.clone()) {
            (Some(agent_id), Some(registry)) => {
                dispatch(registry, agent_id, vec![event_type.to_string()]);
            }
            _ => state.pending.push(event_type.to_string()),
        }
    }

    /// Store the newly assigned agent id and drain the pending queue in FIFO
    /// order with it.
    pub fn set_agent_id(&self, agent_id: &str) {
        let mut state = self.state.lock();
        state.agent_id = Some(agent_id.to_string());
        if state.pending.is_empty() {
            return;
        }
        let drained = std::mem::take(&mut state.pending);
        if let Some(registry) = state.registry.clone() {
            dispatch(registry, agent_id.to_string(), drained);
        }
    }

    /// Forget the agent id on close. Late events queue again rather than
    /// reporting under a stale id.
    pub fn clear_agent_id(&self) {
        self.state.lock().agent_id = None;
    }
}

/// Send events sequentially on a detached task so queue order is preserved.
fn dispatch(registry: Arc<RegistryClient>, agent_id: String, event_types: Vec<String>) {
    tokio::spawn(async move {
        for event_type in event_types {
            if let Err(err) = registry.report_event(&agent_id, &event_type).await {
                debug!(%agent_id, %event_type, error = %err, "failed to report event");
            }
        }
    });
}
