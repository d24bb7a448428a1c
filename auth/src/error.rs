//! Error types for identity operations.

use thiserror::Error;
use travio_core::ErrorKind;

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Failure modes of registration, login and token rotation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    // ═══════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════

    /// Email is already registered.
    #[error("Email already registered")]
    AlreadyExists,

    /// Unknown email or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token failed signature, issuer, expiry or record checks.
    #[error("Invalid token")]
    InvalidToken,

    /// A revoked refresh token was replayed; the whole family is now revoked.
    #[error("Refresh token reuse detected")]
    RefreshReused,

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Requested session does not exist or belongs to someone else.
    #[error("Session not found")]
    SessionNotFound,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Relational store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Cache failure (blacklist).
    #[error("Cache error: {0}")]
    Cache(String),

    /// Rotation did not finish within its deadline.
    #[error("Token rotation timed out")]
    Timeout,

    /// Hashing, signing or serialization failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::InvalidToken => ErrorKind::InvalidToken,
            Self::RefreshReused => ErrorKind::RefreshReused,
            Self::Validation(_) => ErrorKind::InvalidArgument,
            Self::SessionNotFound => ErrorKind::NotFound,
            Self::Database(_) | Self::Cache(_) | Self::Timeout => ErrorKind::ProviderUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if this error is due to invalid user input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use travio_identity::IdentityError;
    /// assert!(IdentityError::InvalidCredentials.is_user_error());
    /// assert!(!IdentityError::Timeout.is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        self.kind().is_client_error()
    }

    /// Returns `true` if this error indicates a likely credential theft.
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(self, Self::RefreshReused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_transport_kinds() {
        assert_eq!(IdentityError::AlreadyExists.kind().http_status(), 409);
        assert_eq!(IdentityError::RefreshReused.kind(), ErrorKind::RefreshReused);
        assert_eq!(IdentityError::Timeout.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(
            IdentityError::Validation("email".into()).kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn reuse_is_a_security_issue() {
        assert!(IdentityError::RefreshReused.is_security_issue());
        assert!(!IdentityError::InvalidToken.is_security_issue());
    }
}
