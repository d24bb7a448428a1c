//! Error types for pricing operations.

use crate::expr::CompileError;
use thiserror::Error;
use travio_core::ErrorKind;

/// Result type alias for pricing operations.
pub type Result<T> = std::result::Result<T, PricingError>;

/// Failure modes of rule management and price calculation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    // ═══════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════

    /// A rule condition does not compile.
    #[error("Invalid condition: {0}")]
    Compile(#[from] CompileError),

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No rule with that id.
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Rule store failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl PricingError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile(_) | Self::Validation(_) => ErrorKind::InvalidArgument,
            Self::RuleNotFound(_) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::ProviderUnavailable,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_transport_kinds() {
        let compile = CompileError::new(3, "unknown field 'seat'");
        assert_eq!(PricingError::from(compile).kind().http_status(), 400);
        assert_eq!(PricingError::RuleNotFound("r1".into()).kind().http_status(), 404);
        assert_eq!(PricingError::Database("down".into()).kind(), ErrorKind::ProviderUnavailable);
    }
}
