//! Background heartbeat loop.
//!
//! One liveness call per tick. Consecutive failures stretch the interval
//! with the shared backoff schedule; the first success snaps it back to the
//! configured base.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{ClientInner, Worker};
use crate::retry::backoff;

/// Ceiling for the failure-stretched heartbeat interval.
const HEARTBEAT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);

impl ClientInner {
    /// Launch the heartbeat worker, replacing (cancel, then wait out) any
    /// previous worker so at most one runs.
    pub(crate) async fn start_heartbeat(self: Arc<Self>, agent_id: String) {
        let mut state = self.state.lock().await;

        if let Some(old) = state.worker.take() {
            old.cancel.cancel();
            let _ = old.handle.await;
        }

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let inner = self.clone();

        let handle = tokio::spawn(async move {
            inner.run_heartbeat(&worker_cancel, &agent_id).await;
        });

        state.worker = Some(Worker { cancel, handle });
    }

    /// The heartbeat loop body. Runs on the current worker until canceled;
    /// also entered directly by the background registration worker.
    pub(crate) async fn run_heartbeat(&self, cancel: &CancellationToken, agent_id: &str) {
        let base = self.config.heartbeat_interval;

        // Initial heartbeat fires immediately.
        let mut failures: u32 = if self.send_heartbeat(agent_id).await { 0 } else { 1 };

        loop {
            let wait = backoff(base, HEARTBEAT_BACKOFF_MAX, failures);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            if cancel.is_cancelled() {
                return;
            }

            if self.send_heartbeat(agent_id).await {
                failures = 0;
            } else {
                failures += 1;
            }
        }
    }

    async fn send_heartbeat(&self, agent_id: &str) -> bool {
        match self.registry.heartbeat(agent_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%agent_id, error = %err, "heartbeat failed");
                false
            }
        }
    }
}
