//! Exponential backoff with jitter, and a cancelable retry driver.
//!
//! Registration retry and heartbeat pacing share this one schedule so the
//! whole SDK has a single tunable failure cadence.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Returned by [`retry_with_backoff`] when the cancellation token fired
/// before the operation succeeded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Canceled;

/// Next backoff interval for the given consecutive failure count.
///
/// `failures == 0` returns exactly `base`. Otherwise the interval is
/// `min(base * 2^failures, max)` with ±25% jitter, clamped below at `base`.
/// Callers may observe at most `max * 1.25`.
pub(crate) fn backoff(base: Duration, max: Duration, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return base;
    }

    let base_s = base.as_secs_f64();
    let interval = (base_s * 2f64.powi(consecutive_failures as i32)).min(max.as_secs_f64());

    let jitter = interval * 0.25 * rand::thread_rng().gen_range(-1.0..1.0);
    Duration::from_secs_f64((interval + jitter).max(base_s))
}

/// Retry `operation` until it succeeds or `cancel` fires.
///
/// There is no attempt cap; only cancellation stops the loop. The operation's
/// error is discarded here -- callers log failures inside the closure.
pub(crate) async fn retry_with_backoff<T, E, F, Fut>(
    cancel: &CancellationToken,
    base: Duration,
    max: Duration,
    mut operation: F,
) -> Result<T, Canceled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Canceled);
        }

        if let Ok(value) = operation().await {
            return Ok(value);
        }

        failures += 1;
        let wait = backoff(base, max, failures);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Canceled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
