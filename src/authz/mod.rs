//! Authorization decisions with degraded-mode fallback.
//!
//! # Data Flow
//! ```text
//! caller (GraphQL resolver, CLI, ...)
//!     → coordinator.rs
//!         → cache::AuthDecisionCache
//!         → resilience::CircuitBreaker → resilience::RetryExecutor → backend
//!         → fallback.rs (when the backend cannot answer)
//!     → PermissionResult { allowed, source, latency }
//!     → audit.rs sink
//! ```
//!
//! # Design Decisions
//! - Every answer carries its provenance (cache, live service, fallback)
//! - Backend outages never surface as errors; the fallback answers instead
//! - The fallback only ever grants reads

pub mod audit;
pub mod coordinator;
pub mod fallback;
pub mod health;
pub mod types;

pub use audit::{AuditRecord, AuditSink, ChannelAuditSink, TracingAuditSink};
pub use coordinator::{AuthorizationCoordinator, AuthorizeError, CoordinatorBuilder};
pub use fallback::{FallbackAuthorizer, FallbackRule, FallbackStats};
pub use health::{HealthReport, HealthStatus};
pub use types::{
    ActionKind, CheckInputError, DecisionSource, PermissionCheck, PermissionResult, ResourceRef,
    Visibility, DEGRADED_DENIAL, OWNER_NAMESPACED_KINDS,
};
