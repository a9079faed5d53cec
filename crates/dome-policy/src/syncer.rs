//! Background policy bundle synchronization.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Engine, Fetcher, PolicyError};

/// Default tick when no refresh interval is configured.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct SyncInner {
    fetcher: Fetcher,
    engine: Arc<Engine>,
}

impl SyncInner {
    async fn sync_once(&self) -> Result<(), PolicyError> {
        let result = self.fetcher.fetch().await?;
        if !result.changed {
            debug!("policy bundle unchanged");
            return Ok(());
        }
        let Some(bundle) = result.bundle else {
            return Ok(());
        };

        self.engine.load_bundle(
            bundle
                .policies
                .iter()
                .map(|p| (p.filename.as_str(), p.content.as_str())),
            &bundle.version,
        )?;

        info!(
            version = %bundle.version,
            policy_count = self.engine.policy_count(),
            "policy bundle updated"
        );
        Ok(())
    }
}

/// Periodically fetches the policy bundle and loads new versions into the
/// engine. One initial sync runs inside [`start`](Syncer::start); failures
/// there are logged, not fatal.
#[derive(Debug)]
pub struct Syncer {
    inner: Arc<SyncInner>,
    interval: Duration,
    worker: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Syncer {
    pub fn new(fetcher: Fetcher, engine: Arc<Engine>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        Self {
            inner: Arc::new(SyncInner { fetcher, engine }),
            interval,
            worker: None,
        }
    }

    /// Run one initial sync, then start the background loop.
    pub async fn start(&mut self) {
        if let Err(err) = self.inner.sync_once().await {
            warn!(error = %err, "initial policy sync failed");
        }

        let inner = self.inner.clone();
        let interval = self.interval;
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = inner.sync_once().await {
                    warn!(error = %err, "policy sync failed");
                }
            }
        });

        self.worker = Some((cancel, handle));
    }

    /// Signal the loop to stop and wait for it to exit. Safe to call when
    /// the syncer never started.
    pub async fn stop(&mut self) {
        if let Some((cancel, handle)) = self.worker.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    /// One synchronous fetch-and-load pass, exposed for callers that need an
    /// on-demand refresh.
    pub async fn sync_once(&self) -> Result<(), PolicyError> {
        self.inner.sync_once().await
    }
}
