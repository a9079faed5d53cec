//! # dome-sdk -- Rust client SDK for the Dome Platform
//!
//! The SDK handles agent registration, heartbeat, policy checks, and
//! lifecycle management. Agents integrate with a few lines of code and
//! heartbeat automatically.
//!
//! Quick start using the global client:
//!
//! ```no_run
//! # async fn example() -> Result<(), dome_sdk::DomeError> {
//! dome_sdk::init(
//!     dome_sdk::Client::builder().credentials(std::env::var("DOME_AGENT_TOKEN").unwrap_or_default()),
//! )
//! .await?;
//!
//! let agent = dome_sdk::start(dome_sdk::StartOptions {
//!     name: "my-agent".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! // ... agent work ...
//!
//! dome_sdk::shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! For explicit client management:
//!
//! ```no_run
//! # async fn example() -> Result<(), dome_sdk::DomeError> {
//! let client = dome_sdk::Client::builder()
//!     .api_url("https://api.dome.example.com")
//!     .api_key("dev-key")
//!     .build()?;
//!
//! let agent = client
//!     .start(dome_sdk::StartOptions {
//!         name: "my-agent".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let decision = client
//!     .check(dome_sdk::CheckRequest {
//!         action: "mcp:call".into(),
//!         resource: "hr-mcp/search_employees".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod agent;
mod check;
mod client;
mod config;
mod error;
mod events;
mod global;
mod heartbeat;
mod middleware;
mod registry;
mod retry;

pub use agent::{AgentInfo, StartOptions};
pub use check::{CheckRequest, Decision};
pub use client::Client;
pub use config::{
    ClientBuilder, DEFAULT_API_URL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_POLICY_REFRESH_INTERVAL,
};
pub use error::DomeError;
pub use global::{check, init, shutdown, start};
pub use middleware::governance_middleware;
pub use registry::RegistryError;

pub(crate) use global::global_client;

/// Cedar entity and action names used in policy bundles.
pub use dome_policy::entities;
