//! Health of the authorization path as a whole.
//!
//! # States
//! - Healthy: circuit closed and the backend answers its probe
//! - Degraded: decisions are (or may be) served by the fallback policy
//! - Unhealthy: the backend refuses our credentials, so it will not
//!   recover without operator action

use std::time::Duration;

use serde::Serialize;

use crate::backend::{AuthError, PermissionBackend};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{CircuitBreaker, CircuitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub circuit: CircuitState,
    pub backend_error: Option<String>,
    pub fallback_available: bool,
}

/// Probe the backend unless the circuit is open.
///
/// The probe bypasses the breaker so health polling never changes its
/// failure accounting.
pub async fn assess(
    backend: &dyn PermissionBackend,
    breaker: &CircuitBreaker,
    deadline: Duration,
) -> HealthReport {
    let circuit = breaker.state();
    let report = |status, backend_error| HealthReport {
        status,
        circuit,
        backend_error,
        fallback_available: true,
    };

    if circuit == CircuitState::Open {
        return report(HealthStatus::Degraded, Some("circuit open".to_string()));
    }

    match with_deadline(deadline, backend.health_check()).await {
        Ok(Ok(())) if circuit == CircuitState::Closed => report(HealthStatus::Healthy, None),
        Ok(Ok(())) => report(HealthStatus::Degraded, None),
        Ok(Err(err @ AuthError::Unauthenticated(_))) => {
            tracing::error!(error = %err, "permission backend rejects our credentials");
            report(HealthStatus::Unhealthy, Some(err.to_string()))
        }
        Ok(Err(err)) => report(HealthStatus::Degraded, Some(err.to_string())),
        Err(elapsed) => report(HealthStatus::Degraded, Some(elapsed.to_string())),
    }
}
