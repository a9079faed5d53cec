//! Cedar entity model for agent governance.
//!
//! Entity type names must match the control plane's policy authoring model
//! exactly; a drift here silently changes every decision.

/// Principal type for registered agents.
pub const ENTITY_TYPE_AGENT: &str = "Dome::Agent";
/// Action entity type.
pub const ENTITY_TYPE_ACTION: &str = "Dome::Action";
/// Resource type for MCP tools.
pub const ENTITY_TYPE_MCP_TOOL: &str = "Dome::MCPTool";
/// Resource type for LLM models.
pub const ENTITY_TYPE_LLM_MODEL: &str = "Dome::LLMModel";
/// Resource type for managed credentials.
pub const ENTITY_TYPE_CREDENTIAL: &str = "Dome::Credential";
/// Generic resource type for everything else.
pub const ENTITY_TYPE_RESOURCE: &str = "Dome::Resource";

/// Well-known governed actions.
pub const ACTION_MCP_CALL: &str = "mcp:call";
pub const ACTION_LLM_CHAT: &str = "llm:chat";
pub const ACTION_CREDENTIAL_FETCH: &str = "credential:fetch";
pub const ACTION_CREDENTIAL_REVOKE: &str = "credential:revoke";
