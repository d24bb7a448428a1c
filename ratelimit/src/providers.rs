//! Window storage trait.
//!
//! A window is a time-scored set per key. Each member records the arrival
//! time and the cost it consumed; usage is the sum of costs still inside
//! the window.
//!
//! ```text
//! ratelimit:<tier>:<identity>   ZSET  "<nanos>-<seq>:<cost>" scored by arrival (µs)
//! ```

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Outcome of one acquire against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Whether the cost was recorded.
    pub allowed: bool,
    /// Usage inside the window before this request.
    pub used: u64,
}

/// One pending window entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquire<'a> {
    /// Window key.
    pub key: &'a str,
    /// Unique member for this request.
    pub member: &'a str,
    /// Cost recorded if admitted.
    pub cost: u64,
    /// Window budget.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

/// Storage for sliding windows.
pub trait RateLimitStore: Send + Sync {
    /// Drop entries scored below `now - window`, sum the remaining
    /// costs, and record `request.cost` at `now` iff
    /// `used + cost <= limit`. The key's ttl is refreshed to twice the
    /// window. All of it happens as one step.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Cache` on cache failure.
    fn acquire(
        &self,
        request: &Acquire<'_>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<WindowState>> + Send;

    /// Usage inside the window ending at `now`, without recording anything.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Cache` on cache failure.
    fn usage(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Forget a key's window.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Cache` on cache failure.
    fn reset(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Microseconds since the epoch; exact in an `f64` score.
#[must_use]
pub fn score_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

/// Window length in microseconds.
#[must_use]
pub fn window_micros(window: Duration) -> i64 {
    i64::try_from(window.as_micros()).unwrap_or(i64::MAX)
}
