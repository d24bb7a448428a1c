//! Argon2id password hashing.
//!
//! Hashing runs on the blocking pool. Verification of an unknown account
//! goes through [`PasswordHasher::verify_dummy`], which burns the same work
//! against a fixed hash so response time does not reveal whether an email
//! is registered.

use crate::config::PasswordHashingConfig;
use crate::error::{IdentityError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::{Arc, OnceLock};

const DUMMY_PASSWORD: &str = "travio-timing-equaliser";

/// Memory-hard password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    argon: Argon2<'static>,
    dummy_hash: Arc<OnceLock<String>>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Create a hasher with the given work factors.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] if Argon2 rejects the parameters.
    pub fn new(config: PasswordHashingConfig) -> Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| IdentityError::Validation(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_hash: Arc::new(OnceLock::new()),
        })
    }

    fn hash_blocking(argon: &Argon2<'static>, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        argon
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| IdentityError::Internal(format!("password hashing failed: {e}")))
    }

    fn verify_blocking(argon: &Argon2<'static>, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .is_ok_and(|parsed| argon.verify_password(password.as_bytes(), &parsed).is_ok())
    }

    /// Hash a password into PHC string format.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Internal`] if hashing fails or the blocking
    /// task is cancelled.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let argon = self.argon.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || Self::hash_blocking(&argon, &password))
            .await
            .map_err(|e| IdentityError::Internal(format!("hashing task failed: {e}")))?
    }

    /// Verify a password against a stored hash.
    ///
    /// A malformed stored hash verifies as `false`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Internal`] if the blocking task is cancelled.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let argon = self.argon.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || Self::verify_blocking(&argon, &password, &hash))
            .await
            .map_err(|e| IdentityError::Internal(format!("verification task failed: {e}")))
    }

    /// Spend one verification's worth of work and return `false`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Internal`] if the blocking task is cancelled.
    pub async fn verify_dummy(&self, password: &str) -> Result<bool> {
        let argon = self.argon.clone();
        let dummy = Arc::clone(&self.dummy_hash);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let hash = match dummy.get() {
                Some(hash) => hash.clone(),
                None => {
                    let computed = Self::hash_blocking(&argon, DUMMY_PASSWORD).unwrap_or_default();
                    dummy.get_or_init(|| computed).clone()
                }
            };
            let _ = Self::verify_blocking(&argon, &password, &hash);
            false
        })
        .await
        .map_err(|e| IdentityError::Internal(format!("verification task failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(PasswordHashingConfig::insecure_fast()).unwrap()
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).await.unwrap());
        assert!(!hasher.verify("wrong horse", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn salts_differ_per_hash() {
        let hasher = hasher();
        let a = hasher.hash("same").await.unwrap();
        let b = hasher.hash("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn malformed_hash_never_verifies() {
        assert!(!hasher().verify("x", "not-a-phc-string").await.unwrap());
    }

    #[tokio::test]
    async fn dummy_verification_is_always_false() {
        let hasher = hasher();
        assert!(!hasher.verify_dummy(DUMMY_PASSWORD).await.unwrap());
        assert!(!hasher.verify_dummy("anything").await.unwrap());
    }

    #[test]
    fn rejects_impossible_parameters() {
        assert!(PasswordHasher::new(PasswordHashingConfig::new(0, 0, 0)).is_err());
    }
}
