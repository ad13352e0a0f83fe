//! Retry logic with a delay schedule and a retry budget.
//!
//! # Responsibilities
//! - Decide whether a failure is retryable ([`Retryable`])
//! - Bound total attempts per call
//! - Enforce a retry budget (retries per request within a time window)
//! - Sleep between attempts according to a [`Backoff`]
//!
//! # Design Decisions
//! - A plain loop; dropping the returned future cancels the pending
//!   attempt or the sleep between attempts
//! - Non-retryable errors return immediately, whatever the attempt count
//! - The budget is shared across calls so a wide outage does not
//!   multiply load on the backend

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Classifies an error as transient or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Caps retries to a fraction of recent request volume.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    min_retries: u64,
    window: Duration,
    state: Mutex<BudgetWindow>,
}

#[derive(Debug)]
struct BudgetWindow {
    started: Instant,
    requests: u64,
    retries: u64,
}

impl RetryBudget {
    pub fn new(ratio: f64, min_retries: u64, window: Duration) -> Self {
        Self {
            ratio,
            min_retries,
            window,
            state: Mutex::new(BudgetWindow {
                started: Instant::now(),
                requests: 0,
                retries: 0,
            }),
        }
    }

    /// A budget that never refuses a retry.
    pub fn unlimited() -> Self {
        Self::new(1.0, u64::MAX, Duration::from_secs(3600))
    }

    pub fn record_request(&self) {
        let mut state = self.window();
        state.requests += 1;
    }

    /// Spend one retry if the budget allows it.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.window();
        let allowed = ((state.requests as f64) * self.ratio) as u64;
        if state.retries >= allowed.max(self.min_retries) {
            return false;
        }
        state.retries += 1;
        true
    }

    fn window(&self) -> std::sync::MutexGuard<'_, BudgetWindow> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.started.elapsed() >= self.window {
            state.started = Instant::now();
            state.requests = 0;
            state.retries = 0;
        }
        state
    }
}

/// Runs an async operation with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    backoff: Backoff,
    budget: Arc<RetryBudget>,
}

impl RetryExecutor {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            budget: Arc::new(RetryBudget::unlimited()),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff()).with_budget(Arc::new(RetryBudget::new(
            config.budget_ratio,
            config.min_retries,
            config.budget_window(),
        )))
    }

    pub fn with_budget(mut self, budget: Arc<RetryBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Call `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The last error is returned when retries are exhausted.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        self.budget.record_request();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "backend call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::debug!(attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            if attempt >= self.max_attempts {
                tracing::warn!(attempts = attempt, error = %err, "retries exhausted");
                return Err(err);
            }
            if !self.budget.try_acquire() {
                tracing::warn!(attempt, error = %err, "retry budget exhausted");
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying backend call"
            );
            metrics::record_retry();
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backoff::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(3, Backoff::none());

        let out = executor
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(out, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(4, Backoff::none());

        let out: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;

        assert_eq!(out, Err(TestError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(5, Backoff::none());

        let out: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Permanent)
            })
            .await;

        assert_eq!(out, Err(TestError::Permanent));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        let executor = RetryExecutor::new(
            3,
            Backoff::new(
                BackoffStrategy::Fixed {
                    delay: Duration::from_millis(20),
                },
                false,
            ),
        );
        let start = Instant::now();

        let _: Result<(), _> = executor.run(|| async { Err(TestError::Transient) }).await;

        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_dropping_the_call_cancels_pending_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(
            10,
            Backoff::new(
                BackoffStrategy::Fixed {
                    delay: Duration::from_millis(50),
                },
                false,
            ),
        );

        let counter = calls.clone();
        let out = tokio::time::timeout(
            Duration::from_millis(20),
            executor.run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError::Transient)
                }
            }),
        )
        .await;
        assert!(out.is_err());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_stops_retries() {
        let calls = AtomicU32::new(0);
        let budget = Arc::new(RetryBudget::new(0.0, 1, Duration::from_secs(60)));
        let executor = RetryExecutor::new(5, Backoff::none()).with_budget(budget);

        let _: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;
        // one first attempt plus the single budgeted retry
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        calls.store(0, Ordering::SeqCst);
        let _: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_budget_scales_with_requests() {
        let budget = RetryBudget::new(0.5, 0, Duration::from_secs(60));
        for _ in 0..4 {
            budget.record_request();
        }
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
    }
}
