//! # dome-policy -- Local Cedar policy evaluation for the Dome SDK
//!
//! Agents evaluate authorization decisions locally against a policy bundle
//! fetched from the control plane:
//!
//! - [`Engine`] compiles bundles into a Cedar policy set and evaluates
//!   [`CheckInput`]s for an [`AgentContext`] principal.
//! - [`Fetcher`] retrieves versioned bundles with ETag-based conditional
//!   requests over the shared authenticated transport.
//! - [`Syncer`] keeps the engine current on a background tick.
//!
//! The entity model ([`entities`]) mirrors the control plane's policy
//! authoring model: `Dome::Agent` principals act on `Dome::MCPTool`,
//! `Dome::LLMModel`, `Dome::Credential`, or generic `Dome::Resource`
//! entities.

pub mod entities;
mod engine;
mod error;
mod fetcher;
mod syncer;

pub use engine::{AgentContext, CheckInput, Decision, Engine};
pub use error::PolicyError;
pub use fetcher::{BundleResponse, FetchResult, Fetcher, PolicyFile};
pub use syncer::Syncer;
