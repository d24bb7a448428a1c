//! Error types for rate limiting.

use chrono::{DateTime, Utc};
use thiserror::Error;
use travio_core::ErrorKind;

/// Result type alias for rate limiter operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Rate limiter failures.
///
/// A denied request is not an error for [`crate::RateLimiter`]; it is a
/// [`crate::Decision`] with `allowed == false`. [`RateLimitError::Exceeded`]
/// exists for callers that want to bubble a denial up through `?`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The key used up its window.
    #[error("Rate limit exceeded: limit {limit}, resets at {reset_at}")]
    Exceeded {
        /// Effective limit of the window.
        limit: u64,
        /// When the window resets.
        reset_at: DateTime<Utc>,
    },

    /// Limiter configuration was rejected.
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// Cache (Redis) failure. Callers fail open on this.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl RateLimitError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Exceeded { .. } => ErrorKind::RateLimited,
            Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
            Self::Cache(_) => ErrorKind::ProviderUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let exceeded = RateLimitError::Exceeded {
            limit: 3,
            reset_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert_eq!(exceeded.kind().http_status(), 429);
        assert_eq!(RateLimitError::Cache("down".into()).kind().http_status(), 503);
        assert!(RateLimitError::Cache("down".into()).kind().is_transient());
    }
}
