//! Identity configuration.
//!
//! Values come from the deployment (see the server's `Config::from_env`);
//! nothing here is read from the environment directly.

use crate::error::{IdentityError, Result};
use chrono::Duration;

/// Default issuer claim for every token minted by this service.
pub const DEFAULT_ISSUER: &str = "travio-identity";

/// Argon2id work factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashingConfig {
    /// Memory cost in KiB.
    ///
    /// Default: 19456 (19 MiB)
    pub memory_kib: u32,

    /// Number of passes.
    ///
    /// Default: 2
    pub iterations: u32,

    /// Degree of parallelism.
    ///
    /// Default: 1
    pub parallelism: u32,
}

impl PasswordHashingConfig {
    /// Create hashing configuration with explicit work factors.
    #[must_use]
    pub const fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    /// Cheapest parameters Argon2 accepts. Only for tests.
    #[must_use]
    pub const fn insecure_fast() -> Self {
        Self::new(8, 1, 1)
    }
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self::new(19_456, 2, 1)
    }
}

/// Token and session configuration.
#[derive(Clone)]
pub struct IdentityConfig {
    /// HMAC key for access tokens.
    pub access_secret: String,

    /// HMAC key for refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: String,

    /// `iss` claim written and required on every token.
    pub issuer: String,

    /// Access token lifetime.
    ///
    /// Default: 15 minutes
    pub access_ttl: Duration,

    /// Refresh token lifetime.
    ///
    /// Default: 7 days
    pub refresh_ttl: Duration,

    /// Deadline for one refresh rotation, independent of the caller's.
    ///
    /// Default: 5 seconds
    pub rotation_timeout: std::time::Duration,

    /// How often expired refresh records are purged.
    ///
    /// Default: 1 hour
    pub cleanup_interval: std::time::Duration,

    /// Password hashing work factors.
    pub hashing: PasswordHashingConfig,
}

impl IdentityConfig {
    /// Create configuration with the two signing keys and default lifetimes.
    #[must_use]
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            rotation_timeout: std::time::Duration::from_secs(5),
            cleanup_interval: std::time::Duration::from_secs(3600),
            hashing: PasswordHashingConfig::default(),
        }
    }

    /// Set the access token lifetime.
    #[must_use]
    pub const fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set the refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Set the rotation deadline.
    #[must_use]
    pub const fn with_rotation_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.rotation_timeout = timeout;
        self
    }

    /// Set the cleanup interval.
    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: std::time::Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set password hashing work factors.
    #[must_use]
    pub const fn with_hashing(mut self, hashing: PasswordHashingConfig) -> Self {
        self.hashing = hashing;
        self
    }

    /// Set the issuer claim.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Check the configuration is safe to run with.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] if a key is empty, both keys are
    /// equal, or a lifetime is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(IdentityError::Validation("signing keys must not be empty".into()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(IdentityError::Validation(
                "access and refresh signing keys must differ".into(),
            ));
        }
        if self.access_ttl <= Duration::zero() || self.refresh_ttl <= Duration::zero() {
            return Err(IdentityError::Validation("token lifetimes must be positive".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("rotation_timeout", &self.rotation_timeout)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("hashing", &self.hashing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_nominal_lifetimes() {
        let config = IdentityConfig::new("a", "b");
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert_eq!(config.rotation_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.issuer, "travio-identity");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_shared_signing_key() {
        let config = IdentityConfig::new("same", "same");
        assert!(matches!(config.validate(), Err(IdentityError::Validation(_))));
    }

    #[test]
    fn rejects_empty_key_and_zero_ttl() {
        assert!(IdentityConfig::new("", "b").validate().is_err());
        assert!(
            IdentityConfig::new("a", "b")
                .with_access_ttl(Duration::zero())
                .validate()
                .is_err()
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", IdentityConfig::new("top-secret", "other-secret"));
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
