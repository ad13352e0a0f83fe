//! Backend error classification and wire types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authz::types::PermissionCheck;
use crate::resilience::Retryable;

/// Failures of a single backend RPC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No answer within the transport deadline.
    #[error("permission backend timed out")]
    Timeout,

    /// Connection could not be established or was lost.
    #[error("permission backend unreachable: {0}")]
    Unreachable(String),

    /// Backend answered with an overload or server error status.
    #[error("permission backend unavailable (status {0})")]
    Unavailable(u16),

    /// Backend considers the request malformed.
    #[error("permission backend rejected the request: {0}")]
    Rejected(String),

    /// Backend refused our credentials.
    #[error("permission backend refused credentials: {0}")]
    Unauthenticated(String),

    /// Backend answered with something we cannot interpret.
    #[error("unexpected response from permission backend: {0}")]
    Protocol(String),
}

impl AuthError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Timeout => "timeout",
            AuthError::Unreachable(_) => "unreachable",
            AuthError::Unavailable(_) => "unavailable",
            AuthError::Rejected(_) => "rejected",
            AuthError::Unauthenticated(_) => "unauthenticated",
            AuthError::Protocol(_) => "protocol",
        }
    }

    /// Map an HTTP status that is not a success.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 | 404 | 422 => AuthError::Rejected(body),
            401 | 403 => AuthError::Unauthenticated(body),
            408 => AuthError::Timeout,
            429 | 500..=599 => AuthError::Unavailable(status),
            _ => AuthError::Protocol(format!("status {status}: {body}")),
        }
    }
}

impl Retryable for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::Timeout | AuthError::Unreachable(_) | AuthError::Unavailable(_)
        )
    }
}

/// Body of `POST /v1/permissions/check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRequest {
    pub subject: String,
    pub action: String,
    pub resource: String,
}

impl From<&PermissionCheck> for CheckRequest {
    fn from(check: &PermissionCheck) -> Self {
        Self {
            subject: check.subject().to_string(),
            action: check.action().as_str().to_string(),
            resource: check.resource().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackendStats {
    pub total_checks: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Default)]
pub(crate) struct BackendCounters {
    total_checks: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    connection_errors: AtomicU64,
    latency_micros: AtomicU64,
}

impl BackendCounters {
    pub(crate) fn record(&self, outcome: &Result<bool, AuthError>, latency: Duration) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        match outcome {
            Ok(_) => {
                self.successful.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                match err {
                    AuthError::Timeout => {
                        self.timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    AuthError::Unreachable(_) => {
                        self.connection_errors.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> BackendStats {
        let total = self.total_checks.load(Ordering::Relaxed);
        let micros = self.latency_micros.load(Ordering::Relaxed);
        BackendStats {
            total_checks: total,
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            avg_latency_ms: if total == 0 {
                0.0
            } else {
                micros as f64 / total as f64 / 1000.0
            },
        }
    }
}
