//! Local policy checks.

use std::collections::HashMap;

use dome_policy::CheckInput;

use crate::{Client, DomeError};

/// A policy evaluation request.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    /// Operation being performed (e.g. `mcp:call`, `llm:chat`).
    pub action: String,
    /// Target of the action (e.g. `hr-mcp/get_salary`, `openai/gpt-4`).
    pub resource: String,
    /// Resource category: `mcp`, `llm`, `credential`. Inferred from the
    /// action prefix when empty.
    pub resource_type: String,
    /// Additional key-value pairs for policy evaluation.
    pub context: HashMap<String, String>,
}

/// Result of a policy evaluation.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the action is permitted.
    pub allowed: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// Version of the policy bundle used, empty if none loaded.
    pub policy_version: String,
}

impl Client {
    /// Evaluate a policy decision against the locally cached Cedar bundle.
    ///
    /// When policy is disabled or no bundle is loaded yet, the check
    /// short-circuits: allow by default, deny when the client was built with
    /// `fail_closed`.
    pub async fn check(&self, req: CheckRequest) -> Result<Decision, DomeError> {
        let inner = &self.inner;

        if inner.config.disable_policy || !inner.engine.has_policies() {
            let allowed = inner.config.disable_policy || !inner.config.fail_closed;
            return Ok(Decision {
                allowed,
                reason: "no policy bundle loaded".to_string(),
                policy_version: String::new(),
            });
        }

        let agent_ctx = inner.agent_ctx.lock().clone();

        // Required capability defaults to the action itself.
        let required_capability = req
            .context
            .get("required_capability")
            .cloned()
            .unwrap_or_else(|| req.action.clone());

        let decision = inner.engine.evaluate(
            &agent_ctx,
            &CheckInput {
                action: req.action,
                resource: req.resource,
                resource_type: req.resource_type,
                required_capability,
                context: req.context,
            },
        );

        Ok(Decision {
            allowed: decision.allow,
            reason: decision.reason,
            policy_version: decision.policy_version,
        })
    }
}
