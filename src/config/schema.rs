//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]` so a config file only needs the
//! values it wants to change. Durations are stored as integer `*_secs` /
//! `*_ms` fields and exposed as [`Duration`] through accessor methods.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::backoff::{Backoff, BackoffStrategy};

/// Root configuration for the authorization gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthzConfig {
    /// Remote permission service.
    pub backend: BackendConfig,

    /// Decision cache sizing and TTLs.
    pub cache: CacheConfig,

    /// Circuit breaker thresholds.
    pub circuit: CircuitConfig,

    /// Retry policy for backend calls.
    pub retry: RetryConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Operator API.
    pub admin: AdminConfig,
}

/// Remote permission service connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. "http://authz.internal:8443".
    pub endpoint: String,

    /// Bearer secret. Overridden by `AUTHZ_BACKEND_TOKEN` when set.
    pub token: Option<String>,

    /// Transport-level deadline for a single request.
    pub request_timeout_ms: u64,

    /// TCP connect deadline.
    pub connect_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8443".to_string(),
            token: None,
            request_timeout_ms: 2_000,
            connect_timeout_ms: 500,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Decision cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on cached decisions; LRU eviction beyond it.
    pub max_entries: usize,

    /// TTL for decisions confirmed by the live service.
    pub default_ttl_secs: u64,

    /// TTL for decisions granted by the fallback policy.
    pub extended_ttl_secs: u64,

    /// Interval of the background expiry sweep.
    pub cleanup_interval_secs: u64,

    /// Longest a writer waits for the cache write gate before giving up.
    pub lock_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_secs: 300,
            extended_ttl_secs: 1_800,
            cleanup_interval_secs: 60,
            lock_timeout_ms: 50,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn extended_ttl(&self) -> Duration {
        Duration::from_secs(self.extended_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,

    /// Rolling window over which failures are counted.
    pub failure_window_secs: u64,

    /// Time spent Open before a probe is let through.
    pub open_timeout_ms: u64,

    /// Deadline for one protected call, retries included.
    pub call_timeout_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            open_timeout_ms: 30_000,
            call_timeout_ms: 5_000,
        }
    }
}

impl CircuitConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Shape of the delay curve between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Exponential,
    Linear,
    Fixed,
}

/// Retry policy for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, first call included.
    pub max_attempts: u32,

    pub strategy: StrategyKind,

    /// Base delay (exponential), step (linear) or delay (fixed).
    pub base_delay_ms: u64,

    /// Cap for exponential and linear delays.
    pub max_delay_ms: u64,

    /// Growth factor for exponential delays.
    pub factor: u32,

    /// Add uniform random jitter in [0, delay).
    pub jitter: bool,

    /// Retries allowed per request within a budget window.
    pub budget_ratio: f64,

    /// Retries always allowed per budget window.
    pub min_retries: u64,

    pub budget_window_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: StrategyKind::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            factor: 2,
            jitter: true,
            budget_ratio: 0.2,
            min_retries: 10,
            budget_window_secs: 10,
        }
    }
}

impl RetryConfig {
    /// Build the delay schedule described by this section.
    pub fn backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        let strategy = match self.strategy {
            StrategyKind::Exponential => BackoffStrategy::Exponential {
                base,
                factor: self.factor,
                max,
            },
            StrategyKind::Linear => BackoffStrategy::Linear { step: base, max },
            StrategyKind::Fixed => BackoffStrategy::Fixed { delay: base },
        };
        Backoff::new(strategy, self.jitter)
    }

    pub fn budget_window(&self) -> Duration {
        Duration::from_secs(self.budget_window_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is unset.
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub api_key: String,
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
