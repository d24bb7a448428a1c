//! Error types for the admission controller.

use thiserror::Error;
use travio_core::ErrorKind;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Failure modes of joining, admission and ticket checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    // ═══════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════

    /// The user has no entry for this event.
    #[error("User not in queue")]
    NotInQueue,

    /// The waiting set is at capacity.
    #[error("Queue is full")]
    QueueFull,

    /// Ticket is unknown or was consumed.
    #[error("Admission ticket invalid")]
    TicketInvalid,

    /// Ticket outlived its ttl.
    #[error("Admission ticket expired")]
    TicketExpired,

    /// Queue configuration was rejected.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Cache (Redis) failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A stored blob could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInQueue => ErrorKind::NotInQueue,
            Self::QueueFull => ErrorKind::QueueFull,
            Self::TicketInvalid => ErrorKind::TicketInvalid,
            Self::TicketExpired => ErrorKind::TicketExpired,
            Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
            Self::Cache(_) => ErrorKind::ProviderUnavailable,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(QueueError::NotInQueue.kind().http_status(), 404);
        assert_eq!(QueueError::QueueFull.kind().http_status(), 503);
        assert_eq!(QueueError::TicketExpired.kind().http_status(), 403);
        assert_eq!(QueueError::Cache("down".into()).kind().http_status(), 503);
    }
}
