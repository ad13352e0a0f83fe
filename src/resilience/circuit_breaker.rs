//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast without touching it
//! - Half-Open: one probe call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures within the rolling window >= threshold
//! Open → Half-Open: open_timeout elapsed, next caller becomes the probe
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (open timer restarts)
//! ```
//!
//! # Design Decisions
//! - Fail fast in Open state (no waiting for a timeout)
//! - Single probe in Half-Open; concurrent callers are rejected
//! - A per-call deadline counts as a failure
//! - The state lock is never held across an await
//! - A forced-open circuit stays open until forced closed

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::CircuitConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Why a protected call did not produce the operation's own result.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without calling the backend.
    #[error("circuit breaker is open")]
    Open,

    #[error("call exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CircuitStats {
    pub total_calls: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub rejected: u64,
    pub circuit_opens: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    pinned_open: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
            pinned_open: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Probe,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    failure_window: Duration,
    open_timeout: Duration,
    call_timeout: Duration,
    inner: RwLock<BreakerState>,
    total_calls: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    rejected: AtomicU64,
    circuit_opens: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            failure_window: config.failure_window(),
            open_timeout: config.open_timeout(),
            call_timeout: config.call_timeout(),
            inner: RwLock::new(BreakerState::closed()),
            total_calls: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            circuit_opens: AtomicU64::new(0),
        }
    }

    /// Run `op` under the breaker's admission control and deadline.
    ///
    /// Errors returned by `op` and elapsed deadlines count as failures.
    /// Dropping the returned future while it is the half-open probe releases
    /// the probe slot without changing state.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let Some(permit) = self.acquire() else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::record_circuit_rejection();
            return Err(CircuitError::Open);
        };
        let mut guard = ProbeGuard {
            breaker: self,
            armed: permit == Permit::Probe,
        };

        let outcome = with_deadline(self.call_timeout, op()).await;
        guard.armed = false;

        match outcome {
            Ok(Ok(value)) => {
                self.on_success(permit);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure(permit);
                Err(CircuitError::Inner(err))
            }
            Err(elapsed) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                self.on_failure(permit);
                Err(CircuitError::Timeout(elapsed.0))
            }
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn state(&self) -> CircuitState {
        self.read().state
    }

    /// True only in the Open state; Half-Open is not open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Remaining time before an Open circuit admits a probe.
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let s = self.read();
        if s.state != CircuitState::Open || s.pinned_open {
            return None;
        }
        s.opened_at
            .map(|at| self.open_timeout.saturating_sub(at.elapsed()))
    }

    /// Open the circuit and keep it open until [`force_closed`](Self::force_closed).
    pub fn force_open(&self) {
        let mut s = self.write();
        if s.state != CircuitState::Open {
            self.circuit_opens.fetch_add(1, Ordering::Relaxed);
            metrics::record_circuit_open();
        }
        s.state = CircuitState::Open;
        s.opened_at = Some(Instant::now());
        s.probe_in_flight = false;
        s.pinned_open = true;
        metrics::record_circuit_state(CircuitState::Open);
        tracing::warn!("circuit forced open");
    }

    /// Close the circuit and forget recorded failures.
    pub fn force_closed(&self) {
        *self.write() = BreakerState::closed();
        metrics::record_circuit_state(CircuitState::Closed);
        tracing::info!("circuit forced closed");
    }

    /// Close the circuit and zero every counter.
    pub fn reset(&self) {
        *self.write() = BreakerState::closed();
        for counter in [
            &self.total_calls,
            &self.successful,
            &self.failed,
            &self.timeouts,
            &self.rejected,
            &self.circuit_opens,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        metrics::record_circuit_state(CircuitState::Closed);
        tracing::info!("circuit reset");
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            circuit_opens: self.circuit_opens.load(Ordering::Relaxed),
        }
    }

    fn acquire(&self) -> Option<Permit> {
        if self.read().state == CircuitState::Closed {
            return Some(Permit::Normal);
        }

        let mut s = self.write();
        match s.state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::Open => {
                let ready = !s.pinned_open
                    && s.opened_at
                        .map_or(true, |at| at.elapsed() >= self.open_timeout);
                if !ready {
                    return None;
                }
                s.state = CircuitState::HalfOpen;
                s.probe_in_flight = true;
                metrics::record_circuit_state(CircuitState::HalfOpen);
                tracing::info!("circuit half-open, probing backend");
                Some(Permit::Probe)
            }
            CircuitState::HalfOpen => {
                if s.probe_in_flight {
                    None
                } else {
                    s.probe_in_flight = true;
                    Some(Permit::Probe)
                }
            }
        }
    }

    fn on_success(&self, permit: Permit) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        if permit != Permit::Probe {
            return;
        }

        let mut s = self.write();
        if s.state == CircuitState::HalfOpen {
            *s = BreakerState::closed();
            metrics::record_circuit_state(CircuitState::Closed);
            tracing::info!("probe succeeded, circuit closed");
        }
    }

    fn on_failure(&self, permit: Permit) {
        self.failed.fetch_add(1, Ordering::Relaxed);

        let mut s = self.write();
        match (permit, s.state) {
            (Permit::Probe, CircuitState::HalfOpen) => {
                self.trip(&mut s);
                tracing::warn!("probe failed, circuit reopened");
            }
            (Permit::Normal, CircuitState::Closed) => {
                let now = Instant::now();
                s.failures.push_back(now);
                while let Some(oldest) = s.failures.front() {
                    if now.duration_since(*oldest) > self.failure_window {
                        s.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if s.failures.len() >= self.failure_threshold as usize {
                    let failures = s.failures.len();
                    self.trip(&mut s);
                    tracing::warn!(
                        failures,
                        threshold = self.failure_threshold,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            // result of a call admitted before the state changed
            _ => {}
        }
    }

    fn trip(&self, s: &mut BreakerState) {
        s.state = CircuitState::Open;
        s.opened_at = Some(Instant::now());
        s.probe_in_flight = false;
        s.failures.clear();
        self.circuit_opens.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_open();
        metrics::record_circuit_state(CircuitState::Open);
    }

    fn release_probe(&self) {
        let mut s = self.write();
        if s.state == CircuitState::HalfOpen {
            s.probe_in_flight = false;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BreakerState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BreakerState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_threshold", &self.failure_threshold)
            .field("open_timeout", &self.open_timeout)
            .finish()
    }
}

/// Frees the half-open probe slot if the probe is cancelled mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn breaker(threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitConfig {
            failure_threshold: threshold,
            failure_window_secs: 60,
            open_timeout_ms: open_ms,
            call_timeout_ms: 1_000,
        })
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitError<&'static str>> {
        cb.call(|| async { Ok(1) }).await
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_short_circuits() {
        let cb = breaker(3, 60_000);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let out = cb
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("down")
                })
                .await;
            assert!(matches!(out, Err(CircuitError::Inner("down"))));
        }
        assert!(cb.is_open());

        let out = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(out, Err(CircuitError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = cb.stats();
        assert_eq!(stats.circuit_opens, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.failed, 3);
    }

    #[tokio::test]
    async fn test_successes_do_not_open() {
        let cb = breaker(2, 60_000);
        assert!(fail(&cb).await.is_err());
        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let cb = breaker(1, 20);
        assert!(fail(&cb).await.is_err());
        assert!(cb.is_open());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_and_restarts_timer() {
        let cb = breaker(1, 30);
        assert!(fail(&cb).await.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(fail(&cb).await, Err(CircuitError::Inner(_))));
        assert!(cb.is_open());
        assert!(matches!(succeed(&cb).await, Err(CircuitError::Open)));
        assert_eq!(cb.stats().circuit_opens, 2);
    }

    #[tokio::test]
    async fn test_single_probe_in_half_open() {
        let cb = breaker(1, 20);
        assert!(fail(&cb).await.is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;

        let backend_calls = AtomicUsize::new(0);
        let probe = cb.call(|| async {
            backend_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, &str>("probe")
        });
        let other = cb.call(|| async {
            backend_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>("other")
        });

        let (probe, other) = tokio::join!(probe, other);
        assert_eq!(probe.unwrap(), "probe");
        assert!(matches!(other, Err(CircuitError::Open)));
        assert_eq!(backend_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_probe_frees_the_slot() {
        let cb = breaker(1, 20);
        assert!(fail(&cb).await.is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            cb.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, &str>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&cb).await.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_deadline_counts_as_failure() {
        let cb = CircuitBreaker::new(&CircuitConfig {
            failure_threshold: 2,
            failure_window_secs: 60,
            open_timeout_ms: 60_000,
            call_timeout_ms: 10,
        });

        for _ in 0..2 {
            let out = cb
                .call(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, &str>(())
                })
                .await;
            assert!(matches!(out, Err(CircuitError::Timeout(_))));
        }
        assert!(cb.is_open());
        assert_eq!(cb.stats().timeouts, 2);
    }

    #[tokio::test]
    async fn test_forced_open_holds_until_forced_closed() {
        let cb = breaker(5, 10);
        cb.force_open();
        assert!(cb.is_open());
        assert_eq!(cb.time_until_half_open(), None);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(succeed(&cb).await, Err(CircuitError::Open)));

        cb.force_closed();
        assert_eq!(succeed(&cb).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let cb = breaker(1, 60_000);
        assert!(fail(&cb).await.is_err());
        assert!(cb.time_until_half_open().is_some());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().total_calls, 0);
        assert_eq!(cb.stats().circuit_opens, 0);
    }
}
