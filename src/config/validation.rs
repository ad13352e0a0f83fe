//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds >= 1)
//! - Check cross-field constraints (extended TTL not shorter than default)
//! - Refuse to expose the admin API with the placeholder key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AuthzConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{AuthzConfig, PLACEHOLDER_ADMIN_KEY};

/// A single semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AuthzConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.backend.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "backend.endpoint",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("backend.endpoint", e.to_string())),
    }
    if config.backend.request_timeout_ms == 0 {
        errors.push(ValidationError::new("backend.request_timeout_ms", "must be > 0"));
    }
    if config.backend.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_ms", "must be > 0"));
    }

    let cache = &config.cache;
    if cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be > 0"));
    }
    if cache.default_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.default_ttl_secs", "must be > 0"));
    }
    if cache.extended_ttl_secs < cache.default_ttl_secs {
        errors.push(ValidationError::new(
            "cache.extended_ttl_secs",
            "must not be shorter than default_ttl_secs",
        ));
    }
    if cache.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new("cache.cleanup_interval_secs", "must be > 0"));
    }

    let circuit = &config.circuit;
    if circuit.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit.failure_threshold", "must be >= 1"));
    }
    if circuit.failure_window_secs == 0 {
        errors.push(ValidationError::new("circuit.failure_window_secs", "must be > 0"));
    }
    if circuit.open_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit.open_timeout_ms", "must be > 0"));
    }
    if circuit.call_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit.call_timeout_ms", "must be > 0"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be >= 1"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&retry.budget_ratio) {
        errors.push(ValidationError::new("retry.budget_ratio", "must be within [0, 1]"));
    }
    if retry.budget_window_secs == 0 {
        errors.push(ValidationError::new("retry.budget_window_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_ADMIN_KEY {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set before enabling the admin API",
            ));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
