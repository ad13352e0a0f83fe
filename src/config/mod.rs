//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! authz.toml
//!     → loader.rs (read, parse, apply AUTHZ_BACKEND_TOKEN)
//!     → validation.rs (semantic checks, all errors collected)
//!     → AuthzConfig (validated, immutable)
//!     → sections handed to cache, circuit breaker, retry executor, client
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets may come from the environment instead of the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    apply_env_overrides, load_config, load_config_or_default, load_config_str, ConfigError,
};
pub use schema::{
    AdminConfig, AuthzConfig, BackendConfig, CacheConfig, CircuitConfig, ObservabilityConfig,
    RetryConfig, StrategyKind,
};
