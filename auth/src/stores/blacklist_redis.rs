//! Redis-based access-token blacklist.
//!
//! # Architecture
//!
//! - **Key**: `identity:revoked:{jti}` → `"1"`
//! - **TTL**: remaining validity of the access token, so entries disappear
//!   exactly when the token would have expired anyway
//! - **Batch check**: `MGET` over all keys in one round trip

use crate::error::{IdentityError, Result};
use crate::providers::TokenBlacklist;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// `Redis` access-token blacklist.
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisTokenBlacklist {
    conn_manager: ConnectionManager,
}

impl RedisTokenBlacklist {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Cache`] if the URL is malformed or the
    /// connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| IdentityError::Cache(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            IdentityError::Cache(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisTokenBlacklist initialized");
        Ok(Self { conn_manager })
    }

    /// Build from an existing connection manager.
    #[must_use]
    pub const fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Key for a blacklisted jti.
    #[must_use]
    pub fn revoked_key(jti: &str) -> String {
        format!("identity:revoked:{jti}")
    }
}

impl TokenBlacklist for RedisTokenBlacklist {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<()> {
        let seconds = ttl.as_secs();
        if seconds == 0 {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(Self::revoked_key(jti), "1", seconds)
            .await
            .map_err(|e| IdentityError::Cache(format!("Failed to blacklist token: {e}")))?;

        tracing::debug!(jti = %jti, ttl_secs = seconds, "Access token blacklisted");
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::revoked_key(jti))
            .await
            .map_err(|e| IdentityError::Cache(format!("Failed to check blacklist: {e}")))
    }

    async fn are_revoked(&self, jtis: &[String]) -> Result<Vec<bool>> {
        if jtis.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = jtis.iter().map(|jti| Self::revoked_key(jti)).collect();
        let mut conn = self.conn_manager.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| IdentityError::Cache(format!("Failed to check blacklist: {e}")))?;

        Ok(values.into_iter().map(|v| v.is_some()).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn key_schema() {
        assert_eq!(RedisTokenBlacklist::revoked_key("abc"), "identity:revoked:abc");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn revoke_and_check() {
        let blacklist = RedisTokenBlacklist::new("redis://127.0.0.1:6379").await.unwrap();
        let jti = uuid::Uuid::new_v4().to_string();

        assert!(!blacklist.is_revoked(&jti).await.unwrap());
        blacklist.revoke(&jti, Duration::from_secs(30)).await.unwrap();
        assert!(blacklist.is_revoked(&jti).await.unwrap());

        let other = uuid::Uuid::new_v4().to_string();
        let batch = blacklist.are_revoked(&[jti, other]).await.unwrap();
        assert_eq!(batch, vec![true, false]);
    }
}
