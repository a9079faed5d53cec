//! Process-wide client for the quick-start path.

use parking_lot::Mutex;

use crate::{AgentInfo, CheckRequest, Client, ClientBuilder, Decision, DomeError, StartOptions};

static GLOBAL: Mutex<Option<Client>> = Mutex::new(None);

/// Initialize the global Dome client. Call once at startup; calling again
/// replaces (and closes) the previous client.
pub async fn init(builder: ClientBuilder) -> Result<(), DomeError> {
    let prior = GLOBAL.lock().take();
    if let Some(prior) = prior {
        let _ = prior.close().await;
    }

    let client = builder.build()?;
    *GLOBAL.lock() = Some(client);
    Ok(())
}

/// Announce the agent using the global client. [`init`] must run first.
pub async fn start(opts: StartOptions) -> Result<AgentInfo, DomeError> {
    global_client()
        .ok_or(DomeError::NotInitialized)?
        .start(opts)
        .await
}

/// Evaluate a policy decision using the global client. [`init`] must run
/// first.
pub async fn check(req: CheckRequest) -> Result<Decision, DomeError> {
    global_client()
        .ok_or(DomeError::NotInitialized)?
        .check(req)
        .await
}

/// Gracefully stop the global client. Safe to call multiple times.
pub async fn shutdown() -> Result<(), DomeError> {
    let client = GLOBAL.lock().take();
    match client {
        Some(client) => client.close().await,
        None => Ok(()),
    }
}

/// The current global client, if initialized.
pub(crate) fn global_client() -> Option<Client> {
    GLOBAL.lock().clone()
}
