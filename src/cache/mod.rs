//! Authorization decision cache.
//!
//! # Data Flow
//! ```text
//! PermissionCheck
//!     → key.rs (escaped subject:action:resource key)
//!     → decision.rs get (lock-free read, lazy expiry, LRU touch)
//!
//! Grant from live service or fallback
//!     → decision.rs set (bounded wait for the write gate, LRU eviction)
//!
//! Background
//!     → sweeper task drops expired entries every cleanup_interval
//! ```
//!
//! # Design Decisions
//! - Only grants are cached; a denial always goes back to the backend
//! - Contention degrades to a miss, never to a wait or an error
//! - Invalidation patterns are simple leading/trailing `*` globs

pub mod decision;
pub mod key;

pub use decision::{AuthDecisionCache, CacheStats};
pub use key::{CacheKey, KeyPattern};
