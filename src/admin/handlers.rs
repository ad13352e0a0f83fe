use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::authz::{FallbackStats, HealthReport};
use crate::cache::CacheStats;
use crate::resilience::{CircuitState, CircuitStats};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub health: HealthReport,
    pub circuit: CircuitStats,
    pub cache: CacheStats,
    pub fallback: FallbackStats,
}

#[derive(Serialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub stats: CircuitStats,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: Option<String>,
    pub subject: Option<String>,
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let coordinator = &state.coordinator;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        health: coordinator.health().await,
        circuit: coordinator.breaker().stats(),
        cache: coordinator.cache().stats(),
        fallback: coordinator.fallback().stats(),
    })
}

fn circuit_status(state: &AdminState) -> Json<CircuitStatus> {
    let breaker = state.coordinator.breaker();
    Json(CircuitStatus {
        state: breaker.state(),
        stats: breaker.stats(),
    })
}

pub async fn open_circuit(State(state): State<AdminState>) -> Json<CircuitStatus> {
    state.coordinator.breaker().force_open();
    circuit_status(&state)
}

pub async fn close_circuit(State(state): State<AdminState>) -> Json<CircuitStatus> {
    state.coordinator.breaker().force_closed();
    circuit_status(&state)
}

pub async fn reset_circuit(State(state): State<AdminState>) -> Json<CircuitStatus> {
    state.coordinator.breaker().reset();
    circuit_status(&state)
}

pub async fn invalidate_cache(
    State(state): State<AdminState>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, (StatusCode, &'static str)> {
    let cache = state.coordinator.cache();
    let removed = match (request.pattern.as_deref(), request.subject.as_deref()) {
        (Some(pattern), None) => cache.invalidate_pattern(pattern),
        (None, Some(subject)) => cache.invalidate_user(subject),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "exactly one of 'pattern' or 'subject' is required",
            ))
        }
    };
    Ok(Json(InvalidateResponse { removed }))
}

pub async fn clear_cache(State(state): State<AdminState>) -> StatusCode {
    state.coordinator.cache().clear();
    tracing::info!("decision cache cleared by operator");
    StatusCode::NO_CONTENT
}
