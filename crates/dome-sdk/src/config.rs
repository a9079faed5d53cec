//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::{Client, DomeError};

/// Default Dome API server address for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default SDK-side heartbeat interval. Half the server's 60s staleness
/// deadline, giving one retry before the agent appears stale.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default policy bundle refresh interval.
pub const DEFAULT_POLICY_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub(crate) struct ClientConfig {
    pub api_url: String,
    pub api_key: Option<Zeroizing<String>>,
    pub credentials: Option<Zeroizing<String>>,
    pub credentials_file: Option<PathBuf>,
    pub heartbeat_interval: Duration,
    pub disable_heartbeat: bool,
    pub graceful_degradation: bool,
    pub policy_refresh_interval: Duration,
    pub disable_policy: bool,
    pub fail_closed: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            credentials: None,
            credentials_file: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            disable_heartbeat: false,
            graceful_degradation: false,
            policy_refresh_interval: DEFAULT_POLICY_REFRESH_INTERVAL,
            disable_policy: false,
            fail_closed: false,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .field("credentials_file", &self.credentials_file)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("disable_heartbeat", &self.disable_heartbeat)
            .field("graceful_degradation", &self.graceful_degradation)
            .field("policy_refresh_interval", &self.policy_refresh_interval)
            .field("disable_policy", &self.disable_policy)
            .field("fail_closed", &self.fail_closed)
            .finish()
    }
}

/// Builder for [`Client`].
///
/// Authentication is resolved at [`build`](ClientBuilder::build) in priority
/// order: explicit credentials blob, explicit API key, `DOME_AGENT_TOKEN`,
/// `DOME_API_KEY`, `DOME_TOKEN`.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Dome API server URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Authenticate with a static API key. Simpler alternative to
    /// [`credentials`](Self::credentials) for development and testing.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Set the opaque credential token (base64 blob from
    /// `dome agents register`). The SDK decodes it to pick an exchange
    /// strategy automatically.
    pub fn credentials(mut self, blob: impl Into<String>) -> Self {
        self.config.credentials = Some(Zeroizing::new(blob.into()));
        self
    }

    /// Read the credential token from a file at build time.
    pub fn credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_file = Some(path.into());
        self
    }

    /// Set the heartbeat interval. Non-positive values are ignored.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.config.heartbeat_interval = interval;
        }
        self
    }

    /// Skip the background heartbeat loop after registration.
    pub fn without_heartbeat(mut self) -> Self {
        self.config.disable_heartbeat = true;
        self
    }

    /// Convert `start` failures into background retry instead of errors.
    pub fn graceful_degradation(mut self) -> Self {
        self.config.graceful_degradation = true;
        self
    }

    /// Set the policy bundle refresh interval.
    pub fn policy_refresh_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.config.policy_refresh_interval = interval;
        }
        self
    }

    /// Short-circuit every policy check to allow and skip bundle sync.
    pub fn disable_policy(mut self) -> Self {
        self.config.disable_policy = true;
        self
    }

    /// Deny policy checks while no bundle is loaded, instead of the default
    /// fail-open behavior.
    pub fn fail_closed(mut self) -> Self {
        self.config.fail_closed = true;
        self
    }

    /// Resolve authentication and construct the client.
    pub fn build(self) -> Result<Client, DomeError> {
        Client::from_config(self.config)
    }
}
