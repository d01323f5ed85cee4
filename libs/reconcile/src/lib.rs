//! Reconciliation primitives.
//!
//! This library provides helpers for converging a backend resource toward a
//! desired state. Key concepts:
//!
//! - **Convergence status**: how an observed resource relates to the goal.
//! - **Cancellation**: a caller-owned signal (explicit or deadline-based)
//!   that every wait honours promptly.
//! - **Bounded polling**: a fixed-interval wait with a total time budget.
//!
//! # Invariants
//!
//! - A wait never outlives its `PollSpec` timeout or its `CancelSignal`
//! - A wait that gives up always says why (timeout, divergence, cancellation, probe failure)
//! - Waits hold no shared state; concurrent waits are independent

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default total polling budget.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Convergence status for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Resource has converged (current matches desired).
    Converged,

    /// Resource is converging (current is moving toward desired).
    Converging,

    /// Resource has diverged (requires intervention).
    Diverged,

    /// Status is unknown (insufficient data).
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the resource has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true if waiting longer cannot help.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Diverged)
    }
}

/// Something a poll observes and can classify.
pub trait Observed {
    fn convergence(&self) -> ConvergenceStatus;
}

// =============================================================================
// Cancellation
// =============================================================================

/// Why a wait stopped early at the caller's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller fired its cancel handle.
    Cancelled,

    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "was cancelled"),
            Self::DeadlineExceeded => write!(f, "exceeded the caller deadline"),
        }
    }
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every signal derived from this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observer side of a cancellation signal.
///
/// Cheap to clone; clones observe the same handle. A signal whose handle is
/// dropped without firing never cancels (its deadline, if any, still applies).
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Create a linked cancel handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx },
        CancelSignal {
            rx: Some(rx),
            deadline: None,
        },
    )
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Adds a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Adds a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the signal has fired, or `None` if it has not.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(CancelReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(CancelReason::DeadlineExceeded);
        }
        None
    }

    /// Returns true if the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the signal fires, returning the reason.
    pub async fn cancelled(&self) -> CancelReason {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let flag = async {
            let Some(mut rx) = self.rx.clone() else {
                return std::future::pending().await;
            };
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Handle dropped without firing.
                    return std::future::pending().await;
                }
            }
        };

        tokio::select! {
            _ = flag => CancelReason::Cancelled,
            _ = deadline => CancelReason::DeadlineExceeded,
        }
    }
}

// =============================================================================
// Bounded polling
// =============================================================================

/// Fixed-interval polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    /// Sleep between two polls.
    pub interval: Duration,

    /// Total time budget, measured from the first poll.
    pub timeout: Duration,
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollSpec {
    /// Create a poll spec.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Maximum number of polls that fit in the budget (always at least one).
    pub fn max_attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return u32::MAX;
        }
        let slots = self.timeout.as_nanos() / self.interval.as_nanos();
        u32::try_from(slots)
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }
}

/// A successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<T> {
    /// The observation that converged.
    pub value: T,

    /// Number of polls issued.
    pub attempts: u32,

    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Why a wait ended without convergence.
#[derive(Debug, Error)]
pub enum WaitError<T, E> {
    /// The polling budget ran out.
    #[error("timeout after {elapsed:?} ({attempts} polls) waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
        attempts: u32,
        last: Option<T>,
    },

    /// The resource reached a state it cannot converge from.
    #[error("{resource} diverged: {observed}")]
    Diverged { resource: String, observed: T },

    /// The caller cancelled or its deadline passed.
    #[error("wait for {resource} {reason}")]
    Cancelled {
        resource: String,
        reason: CancelReason,
    },

    /// The probe reported a terminal failure.
    #[error("probing {resource} failed: {source}")]
    Probe {
        resource: String,
        #[source]
        source: E,
    },
}

impl<T, E> WaitError<T, E> {
    /// Returns true if the budget ran out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the caller stopped the wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Poll `probe` until it observes a converged value.
///
/// The first poll runs immediately; later polls are spaced by
/// `spec.interval`. The probe returns:
///
/// - `Ok(Some(value))`: an observation, classified through [`Observed`];
/// - `Ok(None)`: an inconclusive poll (e.g. a transient lookup error), retried;
/// - `Err(e)`: a terminal probe failure.
///
/// Both the probe and the sleep race against `cancel`.
pub async fn wait_for<T, E, F, Fut>(
    resource: &str,
    spec: &PollSpec,
    cancel: &CancelSignal,
    mut probe: F,
) -> Result<Converged<T>, WaitError<T, E>>
where
    T: Observed,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + spec.timeout;
    let max_attempts = spec.max_attempts();
    let mut attempts = 0u32;
    let mut last = None;

    let cancelled = |reason| WaitError::Cancelled {
        resource: resource.to_string(),
        reason,
    };

    loop {
        if let Some(reason) = cancel.reason() {
            return Err(cancelled(reason));
        }

        attempts = attempts.saturating_add(1);
        let observation = tokio::select! {
            result = probe() => result,
            reason = cancel.cancelled() => return Err(cancelled(reason)),
        };

        match observation {
            Ok(Some(value)) => {
                let status = value.convergence();
                if status.is_converged() {
                    return Ok(Converged {
                        value,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }
                if status.is_terminal() {
                    return Err(WaitError::Diverged {
                        resource: resource.to_string(),
                        observed: value,
                    });
                }
                last = Some(value);
            }
            Ok(None) => {}
            Err(source) => {
                return Err(WaitError::Probe {
                    resource: resource.to_string(),
                    source,
                });
            }
        }

        if attempts >= max_attempts || Instant::now() + spec.interval > deadline {
            return Err(WaitError::Timeout {
                resource: resource.to_string(),
                elapsed: started.elapsed(),
                attempts,
                last,
            });
        }

        debug!(resource, attempts, "Not converged yet, polling again");

        tokio::select! {
            _ = tokio::time::sleep(spec.interval) => {}
            reason = cancel.cancelled() => return Err(cancelled(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use rstest::rstest;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Building,
        Ready,
        Broken,
    }

    impl fmt::Display for Phase {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Observed for Phase {
        fn convergence(&self) -> ConvergenceStatus {
            match self {
                Phase::Building => ConvergenceStatus::Converging,
                Phase::Ready => ConvergenceStatus::Converged,
                Phase::Broken => ConvergenceStatus::Diverged,
            }
        }
    }

    #[derive(Debug, Error)]
    #[error("gone")]
    struct Gone;

    fn fast() -> PollSpec {
        PollSpec::new(Duration::from_millis(1), Duration::from_millis(500))
    }

    fn scripted(
        script: Vec<Result<Option<Phase>, Gone>>,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<Phase>, Gone>> {
        let script = Mutex::new(VecDeque::from(script));
        move || {
            let next = script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Some(Phase::Building)));
            std::future::ready(next)
        }
    }

    #[test]
    fn test_convergence_status() {
        assert!(ConvergenceStatus::Converged.is_converged());
        assert!(!ConvergenceStatus::Converging.is_terminal());
        assert!(ConvergenceStatus::Diverged.is_terminal());
        assert!(!ConvergenceStatus::Unknown.is_terminal());
    }

    #[rstest]
    #[case(Duration::from_secs(5), Duration::from_secs(300), 61)]
    #[case(Duration::from_secs(5), Duration::from_secs(0), 1)]
    #[case(Duration::from_secs(10), Duration::from_secs(25), 3)]
    fn test_max_attempts(#[case] interval: Duration, #[case] timeout: Duration, #[case] expected: u32) {
        assert_eq!(PollSpec::new(interval, timeout).max_attempts(), expected);
    }

    #[tokio::test]
    async fn test_converges_on_first_poll() {
        let result = wait_for("server/a", &fast(), &CancelSignal::never(), scripted(vec![Ok(Some(Phase::Ready))]))
            .await
            .unwrap();
        assert_eq!(result.value, Phase::Ready);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_converges_after_building() {
        let probe = scripted(vec![
            Ok(Some(Phase::Building)),
            Ok(None),
            Ok(Some(Phase::Ready)),
        ]);
        let result = wait_for("server/a", &fast(), &CancelSignal::never(), probe)
            .await
            .unwrap();
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_diverged() {
        let probe = scripted(vec![Ok(Some(Phase::Building)), Ok(Some(Phase::Broken))]);
        let err = wait_for("server/a", &fast(), &CancelSignal::never(), probe)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Diverged { observed: Phase::Broken, .. }));
    }

    #[tokio::test]
    async fn test_probe_failure_is_terminal() {
        let probe = scripted(vec![Err(Gone)]);
        let err = wait_for("server/a", &fast(), &CancelSignal::never(), probe)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Probe { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let spec = PollSpec::new(Duration::from_millis(5), Duration::from_millis(20));
        let err = wait_for("server/a", &spec, &CancelSignal::never(), scripted(vec![]))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        match err {
            WaitError::Timeout { attempts, last, .. } => {
                assert!(attempts <= spec.max_attempts());
                assert_eq!(last, Some(Phase::Building));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (handle, signal) = cancellation();
        handle.cancel();
        assert!(handle.is_cancelled());

        let err = wait_for("server/a", &fast(), &signal, scripted(vec![Ok(Some(Phase::Ready))]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WaitError::Cancelled {
                reason: CancelReason::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (handle, signal) = cancellation();
        let spec = PollSpec::new(Duration::from_secs(60), Duration::from_secs(600));

        let task = tokio::spawn(async move {
            wait_for("server/a", &spec, &signal, scripted(vec![])).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("wait should exit promptly")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline() {
        let signal = CancelSignal::never().with_timeout(Duration::from_millis(20));
        let spec = PollSpec::new(Duration::from_secs(60), Duration::from_secs(600));

        let err = wait_for("server/a", &spec, &signal, scripted(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WaitError::Cancelled {
                reason: CancelReason::DeadlineExceeded,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, signal) = cancellation();
        drop(handle);
        assert!(!signal.is_cancelled());

        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let signal = CancelSignal::never()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(signal.deadline(), Some(now + Duration::from_secs(5)));
    }
}
