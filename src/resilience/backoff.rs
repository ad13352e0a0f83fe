//! Delay schedules between retry attempts.

use std::time::Duration;

use rand::Rng;

/// How the delay grows with the retry number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * factor^(n-1)`, capped at `max`.
    Exponential {
        base: Duration,
        factor: u32,
        max: Duration,
    },
    /// `step * n`, capped at `max`.
    Linear { step: Duration, max: Duration },
    /// Same delay before every retry.
    Fixed { delay: Duration },
}

/// A strategy plus optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    strategy: BackoffStrategy,
    jitter: bool,
}

impl Backoff {
    pub fn new(strategy: BackoffStrategy, jitter: bool) -> Self {
        Self { strategy, jitter }
    }

    /// No delay at all. Used by tests and callers that pace themselves.
    pub fn none() -> Self {
        Self::new(
            BackoffStrategy::Fixed {
                delay: Duration::ZERO,
            },
            false,
        )
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Delay before retry number `retry` (1 = the first retry).
    ///
    /// With jitter enabled a uniform random amount in `[0, delay)` is added
    /// on top of the scheduled delay.
    pub fn delay(&self, retry: u32) -> Duration {
        let scheduled = self.scheduled(retry);
        if !self.jitter {
            return scheduled;
        }

        let range_ms = scheduled.as_millis() as u64;
        let jitter_ms = if range_ms > 0 {
            rand::thread_rng().gen_range(0..range_ms)
        } else {
            0
        };
        scheduled + Duration::from_millis(jitter_ms)
    }

    fn scheduled(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            BackoffStrategy::Exponential { base, factor, max } => {
                let multiplier = factor.max(1).saturating_pow(retry - 1);
                base.saturating_mul(multiplier).min(max)
            }
            BackoffStrategy::Linear { step, max } => step.saturating_mul(retry).min(max),
            BackoffStrategy::Fixed { delay } => delay,
        }
    }
}
