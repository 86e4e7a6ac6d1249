use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::LabError;

/// Bounded exponential backoff used while waiting on remote jobs.
#[derive(Clone, Debug, PartialEq)]
pub struct PollPolicy {
    /// Pause after the first non-terminal observation.
    pub initial_interval: Duration,
    /// Upper bound for a single pause.
    pub max_interval: Duration,
    /// Growth factor applied to the pause after each observation.
    pub multiplier: f64,
    /// Total time budget for the wait, measured from the first fetch.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// Overrides the total time budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the pause ceiling.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Overrides the first pause.
    pub fn initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }

    pub fn validate(&self) -> Result<(), LabError> {
        if self.initial_interval.is_zero() {
            return Err(LabError::Config(
                "poll initial_interval must be greater than 0".into(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(LabError::Config(
                "poll max_interval must not be smaller than initial_interval".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(LabError::Config("poll multiplier must be >= 1.0".into()));
        }
        if self.timeout.is_zero() {
            return Err(LabError::Config("poll timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub(crate) fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Handle used to cancel an in-flight wait.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The wait observing the paired `AbortSignal` fails with
    /// `LabError::Cancelled` at its next suspension point.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of an `AbortHandle`.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// was dropped without aborting.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a connected cancellation pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

/// Runs one remote call unless cancellation was already requested, and stops
/// waiting on it as soon as the signal fires.
pub(crate) async fn cancellable<T, E>(
    abort: &mut AbortSignal,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, LabError>
where
    LabError: From<E>,
{
    if abort.is_aborted() {
        return Err(LabError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(LabError::Cancelled),
        result = call => result.map_err(LabError::from),
    }
}

/// Polls `fetch` until `is_terminal` accepts a value.
///
/// The first fetch happens immediately and no fetch is issued after a
/// terminal value. `observe` sees every non-terminal value.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    policy: &PollPolicy,
    abort: &mut AbortSignal,
    mut fetch: F,
    is_terminal: impl Fn(&T) -> bool,
    mut observe: impl FnMut(&T),
) -> Result<T, LabError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LabError>>,
{
    policy.validate()?;
    let started = Instant::now();
    let mut pause = policy.initial_interval;
    let mut fetches = 0_u32;
    loop {
        if abort.is_aborted() {
            return Err(LabError::Cancelled);
        }
        let value = tokio::select! {
            value = fetch() => value?,
            _ = abort.cancelled() => return Err(LabError::Cancelled),
        };
        fetches = fetches.saturating_add(1);
        if is_terminal(&value) {
            debug!(what, fetches, elapsed_ms = started.elapsed().as_millis() as u64, "poll reached terminal state");
            return Ok(value);
        }
        observe(&value);

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(LabError::Timeout {
                what: what.to_string(),
                waited: elapsed,
            });
        }
        let sleep_for = pause.min(policy.timeout - elapsed);
        debug!(what, fetches, sleep_ms = sleep_for.as_millis() as u64, "poll waiting");
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = abort.cancelled() => return Err(LabError::Cancelled),
        }
        pause = policy.next_interval(pause);
    }
}
