//! # Travio Rate Limit
//!
//! Redis-backed sliding-window rate limiting with tiered budgets and
//! per-endpoint weights.
//!
//! Every check runs against a time-scored set per key. A request is
//! admitted iff the costs already inside the window plus its own cost stay
//! within the limit; the whole check is a single atomic step on the store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use travio_ratelimit::*;
//!
//! let store = stores::RedisRateLimitStore::new("redis://127.0.0.1:6379").await?;
//! let limiter = RateLimiter::new(store, SystemClock);
//!
//! let tier = RoleTierResolver.resolve(Some("agent"));
//! let decision = limiter.check_tiered("user:42", tier, "/v1/holds").await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod error;
pub mod limiter;
pub mod providers;
pub mod stores;
pub mod tier;

// Mock store (for testing)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{EndpointCosts, RateLimitConfig, TIERED_WINDOW, TierConfig, TierTable};
pub use error::{RateLimitError, Result};
pub use limiter::{Decision, GLOBAL_LABEL, RateLimiter, window_key};
pub use providers::RateLimitStore;
pub use tier::{RoleTierResolver, Tier, TierResolver};
