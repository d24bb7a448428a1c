//! Error taxonomy shared across services.
//!
//! Each service crate defines its own `thiserror` enum. Those enums all
//! classify themselves into an [`ErrorKind`], which is the only thing the
//! transport layer needs in order to pick a status code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-agnostic error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A unique resource (e.g. an email) already exists.
    AlreadyExists,
    /// Unknown account or wrong password.
    InvalidCredentials,
    /// Token failed signature, expiry, issuer or lookup checks.
    InvalidToken,
    /// A revoked refresh token was presented again.
    RefreshReused,
    /// The user has no entry in the waiting room.
    NotInQueue,
    /// The waiting room refused a new member.
    QueueFull,
    /// Admission ticket is unknown.
    TicketInvalid,
    /// Admission ticket has expired.
    TicketExpired,
    /// The caller exceeded its request budget.
    RateLimited,
    /// A downstream dependency (cache, database, bus, columnar store) failed.
    ProviderUnavailable,
    /// Malformed input.
    InvalidArgument,
    /// The requested resource does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::InvalidCredentials | Self::InvalidToken | Self::RefreshReused => 401,
            Self::TicketInvalid | Self::TicketExpired => 403,
            Self::NotInQueue | Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::RateLimited => 429,
            Self::Internal => 500,
            Self::QueueFull | Self::ProviderUnavailable => 503,
        }
    }

    /// Stable machine-readable code, used in JSON error bodies.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AlreadyExists => "already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::RefreshReused => "refresh_reused",
            Self::NotInQueue => "not_in_queue",
            Self::QueueFull => "queue_full",
            Self::TicketInvalid => "token_invalid",
            Self::TicketExpired => "token_expired",
            Self::RateLimited => "rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Internal => "internal_error",
        }
    }

    /// Whether the client caused the error (4xx family).
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        self.http_status() < 500
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ProviderUnavailable | Self::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorKind::RefreshReused.http_status(), 401);
        assert_eq!(ErrorKind::TicketExpired.http_status(), 403);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::ProviderUnavailable.http_status(), 503);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn client_and_transient_classification() {
        assert!(ErrorKind::InvalidCredentials.is_client_error());
        assert!(!ErrorKind::ProviderUnavailable.is_client_error());
        assert!(ErrorKind::ProviderUnavailable.is_transient());
        assert!(!ErrorKind::InvalidToken.is_transient());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotInQueue).unwrap_or_default();
        assert_eq!(json, "\"not_in_queue\"");
    }
}
