//! Metrics collection and exposition.
//!
//! # Metrics
//! - `authz_decisions_total` (counter): decisions by source, result
//! - `authz_decision_duration_seconds` (histogram): end-to-end latency by source
//! - `authz_cache_lookups_total` (counter): hits and misses
//! - `authz_cache_evictions_total` (counter): by reason (lru, expired, invalidated)
//! - `authz_cache_entries` (gauge): current cache size
//! - `authz_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `authz_circuit_opens_total`, `authz_circuit_rejections_total` (counters)
//! - `authz_backend_calls_total` (counter) and
//!   `authz_backend_call_duration_seconds` (histogram): by outcome
//! - `authz_backend_retries_total`, `authz_backend_rejections_total` (counters)
//! - `authz_fallback_evaluations_total` (counter): by rule
//! - `authz_audit_dropped_total` (counter)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::authz::fallback::FallbackRule;
use crate::authz::types::DecisionSource;
use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "authz-gate")
        .install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_decision(source: DecisionSource, allowed: bool, latency: Duration) {
    let result = if allowed { "allowed" } else { "denied" };
    counter!("authz_decisions_total", "source" => source.as_str(), "result" => result)
        .increment(1);
    histogram!("authz_decision_duration_seconds", "source" => source.as_str())
        .record(latency.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("authz_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(reason: &'static str, count: u64) {
    if count > 0 {
        counter!("authz_cache_evictions_total", "reason" => reason).increment(count);
    }
}

pub fn record_cache_size(size: usize) {
    gauge!("authz_cache_entries").set(size as f64);
}

pub fn record_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("authz_circuit_state").set(value);
}

pub fn record_circuit_open() {
    counter!("authz_circuit_opens_total").increment(1);
}

pub fn record_circuit_rejection() {
    counter!("authz_circuit_rejections_total").increment(1);
}

pub fn record_backend_call(outcome: &'static str, latency: Duration) {
    counter!("authz_backend_calls_total", "outcome" => outcome).increment(1);
    histogram!("authz_backend_call_duration_seconds", "outcome" => outcome)
        .record(latency.as_secs_f64());
}

pub fn record_retry() {
    counter!("authz_backend_retries_total").increment(1);
}

pub fn record_rejected_check() {
    counter!("authz_backend_rejections_total").increment(1);
}

pub fn record_fallback(rule: FallbackRule) {
    counter!("authz_fallback_evaluations_total", "rule" => rule.as_str()).increment(1);
}

pub fn record_audit_dropped() {
    counter!("authz_audit_dropped_total").increment(1);
}
