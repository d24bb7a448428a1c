//! Access-token blacklist trait.
//!
//! Access tokens are stateless; a blacklist entry exists only between an
//! explicit logout and the token's natural expiry.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Revoked access-token ids with a time-to-live.
pub trait TokenBlacklist: Send + Sync {
    /// Blacklist `jti` for `ttl`. A zero ttl is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Cache` on cache failure.
    fn revoke(&self, jti: &str, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Whether `jti` is blacklisted.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Cache` on cache failure.
    fn is_revoked(&self, jti: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Check several ids in one round trip, answering in input order.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Cache` on cache failure.
    fn are_revoked(&self, jtis: &[String]) -> impl Future<Output = Result<Vec<bool>>> + Send;
}
