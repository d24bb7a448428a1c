//! Error types for the ingest path.

use thiserror::Error;
use travio_core::ErrorKind;
use travio_core::event_bus::EventBusError;

/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Ingest, storage and scheduling failures.
#[derive(Debug, Error, Clone)]
pub enum IngestError {
    // ═══════════════════════════════════════════════════════════
    // Permanent (message-level)
    // ═══════════════════════════════════════════════════════════

    /// The message can never be turned into a row; it is dropped.
    #[error("Unparseable event: {0}")]
    Parse(String),

    /// The columnar store refused a batch outright; resending it cannot
    /// succeed.
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// Configuration was rejected.
    #[error("Invalid ingest configuration: {0}")]
    InvalidConfig(String),

    /// A cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No job with that name is scheduled.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    // ═══════════════════════════════════════════════════════════
    // Transient
    // ═══════════════════════════════════════════════════════════

    /// The columnar store rejected or did not answer a request.
    #[error("Writer error: {0}")]
    Writer(String),

    /// A job or request exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Message bus failure.
    #[error("Event bus error: {0}")]
    Bus(#[from] EventBusError),

    /// The batcher is no longer accepting rows.
    #[error("Batcher is shut down")]
    Shutdown,
}

impl IngestError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) | Self::Rejected(_) | Self::InvalidConfig(_) | Self::InvalidCron { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::UnknownJob(_) => ErrorKind::NotFound,
            Self::Writer(_) | Self::Timeout(_) | Self::Bus(_) => ErrorKind::ProviderUnavailable,
            Self::Shutdown => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(IngestError::Parse("x".into()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(IngestError::UnknownJob("x".into()).kind().http_status(), 404);
        assert!(IngestError::Writer("503".into()).kind().is_transient());
        assert!(!IngestError::Rejected("400".into()).kind().is_transient());
    }
}
