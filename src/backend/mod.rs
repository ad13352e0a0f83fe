//! Remote permission service integration.
//!
//! # Data Flow
//! ```text
//! PermissionCheck
//!     → client.rs (CheckRequest JSON, bearer token, one HTTP request)
//!     → types.rs (status / transport error → AuthError, call counters)
//!     → Result<bool, AuthError>
//! ```
//!
//! Anything implementing [`PermissionBackend`] can stand in for the HTTP
//! client, which is how tests script outages.

pub mod client;
pub mod types;

pub use client::{ClientBuildError, HttpPermissionClient, PermissionBackend};
pub use types::{AuthError, BackendStats, CheckRequest, CheckResponse};
