//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Permission check on cache miss:
//!     → circuit_breaker.rs (admission: closed / half-open probe / fail fast)
//!     → timeouts.rs (one deadline around the whole protected call)
//!     → retries.rs (retry transient failures with backoff.rs delays)
//!     → backend RPC
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient failures are retried, and only within a shared budget
//! - The breaker sees one outcome per call, after retries
//! - Components are generic over the operation and know nothing of authorization

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::{Backoff, BackoffStrategy};
pub use circuit_breaker::{CircuitBreaker, CircuitError, CircuitState, CircuitStats};
pub use retries::{RetryBudget, RetryExecutor, Retryable};
pub use timeouts::{with_deadline, DeadlineExceeded};
