//! Resilient authorization against a remote permission service.
//!
//! Permission checks go through a decision cache, a circuit breaker and a
//! retry executor before reaching the backend; when the backend cannot
//! answer, a conservative fallback policy decides. Every result reports
//! whether it came from the cache, the live service or the fallback.

pub mod admin;
pub mod authz;
pub mod backend;
pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use authz::{
    ActionKind, AuthorizationCoordinator, AuthorizeError, DecisionSource, PermissionCheck,
    PermissionResult, ResourceRef,
};
pub use backend::{AuthError, HttpPermissionClient, PermissionBackend};
pub use cache::AuthDecisionCache;
pub use config::AuthzConfig;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, RetryExecutor};
