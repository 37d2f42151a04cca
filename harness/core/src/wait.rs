use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::trace;

/// Outcome of a single probe evaluation. The probe returns the observed value
/// instead of smuggling it through captured mutable state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
}

#[derive(Clone, Copy, Debug)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl WaitOptions {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error,
{
    #[error("timed out waiting for {description} after {elapsed:?} ({attempts} attempts)")]
    Timeout {
        description: String,
        elapsed: Duration,
        attempts: u32,
    },
    #[error(
        "chain head did not advance by {wanted} block(s) within {elapsed:?} (last observed height {observed})"
    )]
    Liveness {
        wanted: u64,
        observed: u64,
        elapsed: Duration,
    },
    /// The probe itself failed. A failing probe is a hard error, not a
    /// "not yet true" signal, and is never retried.
    #[error(transparent)]
    Probe(E),
}

/// Repeatedly evaluate `probe` every `interval` until it reports
/// [`PollStatus::Ready`] or `timeout` elapses.
///
/// The probe is always evaluated at least once, even when the timeout is
/// shorter than the interval. A probe that becomes ready within `k` intervals
/// is observed after at most `k + 1` evaluations.
pub async fn wait_for<T, E, F, Fut>(
    description: &str,
    options: WaitOptions,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match probe().await.map_err(WaitError::Probe)? {
            PollStatus::Ready(value) => {
                trace!(description, attempts, "wait condition satisfied");
                return Ok(value);
            }
            PollStatus::Pending => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            return Err(WaitError::Timeout {
                description: description.to_owned(),
                elapsed,
                attempts,
            });
        }
        sleep(options.interval).await;
    }
}

/// [`wait_for`] for plain boolean conditions.
pub async fn wait_for_condition<E, F, Fut>(
    description: &str,
    options: WaitOptions,
    mut probe: F,
) -> Result<(), WaitError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    wait_for(description, options, || {
        let attempt = probe();
        async move {
            attempt.await.map(|ready| {
                if ready {
                    PollStatus::Ready(())
                } else {
                    PollStatus::Pending
                }
            })
        }
    })
    .await
}

/// Wait until the reported head height advances by at least `delta` from the
/// height captured at the first call. Returns the first satisfying height.
///
/// Unlike a plain condition wait this distinguishes a stalled chain: running
/// out of budget surfaces as [`WaitError::Liveness`].
pub async fn wait_for_new_blocks<E, F, Fut>(
    mut head: F,
    delta: u64,
    options: WaitOptions,
) -> Result<u64, WaitError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, E>>,
{
    assert!(delta >= 1, "required block delta must be at least 1");

    let started = Instant::now();
    let start_height = head().await.map_err(WaitError::Probe)?;
    let target = start_height + delta;
    let mut observed = start_height;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            return Err(WaitError::Liveness {
                wanted: delta,
                observed,
                elapsed,
            });
        }
        sleep(options.interval).await;
        observed = head().await.map_err(WaitError::Probe)?;
        if observed >= target {
            return Ok(observed);
        }
    }
}
