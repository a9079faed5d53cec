//! Local Cedar policy evaluation.
//!
//! The engine holds one compiled [`PolicySet`] plus the bundle version it
//! came from. [`Engine::load_bundle`] swaps both atomically under a write
//! lock; [`Engine::evaluate`] takes a short read lock, so concurrent checks
//! see either the previous bundle or the new one, never a partial load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use cedar_policy::{
    Authorizer, Context, Decision as CedarDecision, Entities, Entity, EntityId, EntityTypeName,
    EntityUid, PolicyId, PolicySet, Request, Response, RestrictedExpression,
};
use parking_lot::RwLock;

use crate::entities::{
    ENTITY_TYPE_ACTION, ENTITY_TYPE_AGENT, ENTITY_TYPE_CREDENTIAL, ENTITY_TYPE_LLM_MODEL,
    ENTITY_TYPE_MCP_TOOL, ENTITY_TYPE_RESOURCE,
};
use crate::PolicyError;

/// Agent attributes forming the principal entity at evaluation time.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub id: String,
    pub tenant_id: String,
    pub namespace: String,
    pub capabilities: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
}

/// Request parameters for a policy check.
#[derive(Debug, Clone, Default)]
pub struct CheckInput {
    /// Operation being performed (e.g. `mcp:call`, `llm:chat`).
    pub action: String,
    /// Target of the action (e.g. `hr-mcp/get_salary`, `openai/gpt-4`).
    pub resource: String,
    /// Resource category: `mcp`, `llm`, `credential`, or empty to infer
    /// from the action prefix.
    pub resource_type: String,
    /// Capability the policy context requires; defaults to the action.
    pub required_capability: String,
    /// Additional key-value pairs for policy evaluation.
    pub context: HashMap<String, String>,
}

/// Result of a policy evaluation.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    pub reason: String,
    /// Version of the bundle used, empty if none loaded.
    pub policy_version: String,
}

#[derive(Debug)]
struct EngineState {
    policies: PolicySet,
    version: String,
}

/// Cedar policy engine with no I/O of its own.
#[derive(Debug)]
pub struct Engine {
    state: RwLock<EngineState>,
    authorizer: Authorizer,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with no policies loaded.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState {
                policies: PolicySet::new(),
                version: String::new(),
            }),
            authorizer: Authorizer::new(),
        }
    }

    /// Replace the current policy set with policies parsed from raw Cedar
    /// sources, keyed by filename.
    ///
    /// Each parsed policy is re-keyed `{filename}:{original-id}` so ids stay
    /// unique across files. If any file fails to parse the previous set and
    /// version are retained unchanged.
    pub fn load_bundle<'a, I>(&self, policies: I, version: &str) -> Result<(), PolicyError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut next = PolicySet::new();

        for (filename, content) in policies {
            let parsed = PolicySet::from_str(content).map_err(|e| PolicyError::Compile {
                filename: filename.to_string(),
                message: e.to_string(),
            })?;

            for policy in parsed.policies() {
                let unique = PolicyId::new(format!("{filename}:{}", policy.id()));
                next.add(policy.new_id(unique))
                    .map_err(|e| PolicyError::Compile {
                        filename: filename.to_string(),
                        message: e.to_string(),
                    })?;
            }
        }

        let mut state = self.state.write();
        state.policies = next;
        state.version = version.to_string();
        Ok(())
    }

    /// Evaluate the given agent and request against the loaded policies.
    ///
    /// Entity construction failures are reported as deny decisions with a
    /// `policy error:` reason rather than panicking the caller.
    pub fn evaluate(&self, agent: &AgentContext, input: &CheckInput) -> Decision {
        let state = self.state.read();
        let policy_version = state.version.clone();

        match self.authorize(&state.policies, agent, input) {
            Ok(response) => Decision {
                allow: response.decision() == CedarDecision::Allow,
                reason: extract_reason(&response),
                policy_version,
            },
            Err(message) => Decision {
                allow: false,
                reason: format!("policy error: {message}"),
                policy_version,
            },
        }
    }

    /// Number of loaded policies.
    pub fn policy_count(&self) -> usize {
        self.state.read().policies.policies().count()
    }

    /// Whether any policies are loaded.
    pub fn has_policies(&self) -> bool {
        self.policy_count() > 0
    }

    /// Version of the currently loaded bundle, empty if none.
    pub fn policy_version(&self) -> String {
        self.state.read().version.clone()
    }

    fn authorize(
        &self,
        policies: &PolicySet,
        agent: &AgentContext,
        input: &CheckInput,
    ) -> Result<Response, String> {
        let principal = entity_uid(ENTITY_TYPE_AGENT, &agent.id)?;
        let action = entity_uid(ENTITY_TYPE_ACTION, &input.action)?;
        let resource = entity_uid(resource_entity_type(input), &input.resource)?;

        let context = build_context(input)?;

        let principal_entity = Entity::new(
            principal.clone(),
            agent_attributes(agent),
            HashSet::new(),
        )
        .map_err(|e| e.to_string())?;
        let resource_entity = Entity::new(
            resource.clone(),
            resource_attributes(input),
            HashSet::new(),
        )
        .map_err(|e| e.to_string())?;

        let entities = Entities::from_entities([principal_entity, resource_entity], None)
            .map_err(|e| e.to_string())?;

        let request = Request::new(principal, action, resource, context, None)
            .map_err(|e| e.to_string())?;

        Ok(self.authorizer.is_authorized(&request, policies, &entities))
    }
}

fn entity_uid(type_name: &str, id: &str) -> Result<EntityUid, String> {
    let ty = EntityTypeName::from_str(type_name).map_err(|e| e.to_string())?;
    Ok(EntityUid::from_type_name_and_id(ty, EntityId::new(id)))
}

/// Resolve the resource entity type, inferring the category from the action
/// prefix when the caller did not supply one.
fn resource_entity_type(input: &CheckInput) -> &'static str {
    let mut resource_type = input.resource_type.as_str();
    if resource_type.is_empty() {
        resource_type = if input.action.starts_with("mcp:") {
            "mcp"
        } else if input.action.starts_with("llm:") {
            "llm"
        } else if input.action.starts_with("credential:") {
            "credential"
        } else {
            ""
        };
    }

    match resource_type {
        "mcp" => ENTITY_TYPE_MCP_TOOL,
        "llm" => ENTITY_TYPE_LLM_MODEL,
        "credential" => ENTITY_TYPE_CREDENTIAL,
        _ => ENTITY_TYPE_RESOURCE,
    }
}

fn string_set(values: &[String]) -> RestrictedExpression {
    RestrictedExpression::new_set(
        values
            .iter()
            .map(|v| RestrictedExpression::new_string(v.clone())),
    )
}

fn agent_attributes(agent: &AgentContext) -> HashMap<String, RestrictedExpression> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "id".to_string(),
        RestrictedExpression::new_string(agent.id.clone()),
    );
    if !agent.tenant_id.is_empty() {
        attrs.insert(
            "tenant_id".to_string(),
            RestrictedExpression::new_string(agent.tenant_id.clone()),
        );
    }
    if !agent.namespace.is_empty() {
        attrs.insert(
            "namespace".to_string(),
            RestrictedExpression::new_string(agent.namespace.clone()),
        );
    }
    attrs.insert("capabilities".to_string(), string_set(&agent.capabilities));
    attrs.insert(
        "allowed_tools".to_string(),
        string_set(&agent.allowed_tools),
    );
    attrs.insert("denied_tools".to_string(), string_set(&agent.denied_tools));
    attrs
}

fn resource_attributes(input: &CheckInput) -> HashMap<String, RestrictedExpression> {
    let mut attrs = HashMap::new();
    attrs.insert(
        "path".to_string(),
        RestrictedExpression::new_string(input.resource.clone()),
    );
    if !input.resource_type.is_empty() {
        attrs.insert(
            "type".to_string(),
            RestrictedExpression::new_string(input.resource_type.clone()),
        );
    }
    attrs
}

fn build_context(input: &CheckInput) -> Result<Context, String> {
    // BTreeMap dedupes: an explicit context entry overrides the default.
    let mut pairs = BTreeMap::new();

    let required = if input.required_capability.is_empty() {
        input.action.as_str()
    } else {
        input.required_capability.as_str()
    };
    if !required.is_empty() {
        pairs.insert(
            "required_capability".to_string(),
            RestrictedExpression::new_string(required.to_string()),
        );
    }
    for (k, v) in &input.context {
        pairs.insert(k.clone(), RestrictedExpression::new_string(v.clone()));
    }

    Context::from_pairs(pairs).map_err(|e| e.to_string())
}

fn extract_reason(response: &Response) -> String {
    let mut reasons = response.diagnostics().reason();

    if response.decision() == CedarDecision::Allow {
        return match reasons.next() {
            Some(id) => format!("allowed by policy: {id}"),
            None => "allowed".to_string(),
        };
    }

    if let Some(id) = reasons.next() {
        return format!("denied by policy: {id}");
    }
    if let Some(err) = response.diagnostics().errors().next() {
        return format!("policy error: {err}");
    }
    "denied: no matching permit policy".to_string()
}
