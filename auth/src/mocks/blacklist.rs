//! Mock access-token blacklist for testing.

use crate::error::{IdentityError, Result};
use crate::providers::TokenBlacklist;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock blacklist.
///
/// Entries never expire on their own; the recorded ttl can be inspected.
#[derive(Debug, Clone, Default)]
pub struct MockTokenBlacklist {
    entries: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockTokenBlacklist {
    /// Create an empty blacklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ttl recorded for `jti`, if blacklisted.
    #[must_use]
    pub fn ttl_of(&self, jti: &str) -> Option<Duration> {
        self.entries.lock().ok().and_then(|entries| entries.get(jti).copied())
    }
}

fn poisoned() -> IdentityError {
    IdentityError::Cache("mock blacklist poisoned".to_string())
}

impl TokenBlacklist for MockTokenBlacklist {
    fn revoke(&self, jti: &str, ttl: Duration) -> impl Future<Output = Result<()>> + Send {
        let entries = Arc::clone(&self.entries);
        let jti = jti.to_string();

        async move {
            if ttl.as_secs() > 0 {
                entries.lock().map_err(|_| poisoned())?.insert(jti, ttl);
            }
            Ok(())
        }
    }

    fn is_revoked(&self, jti: &str) -> impl Future<Output = Result<bool>> + Send {
        let entries = Arc::clone(&self.entries);
        let jti = jti.to_string();

        async move { Ok(entries.lock().map_err(|_| poisoned())?.contains_key(&jti)) }
    }

    fn are_revoked(&self, jtis: &[String]) -> impl Future<Output = Result<Vec<bool>>> + Send {
        let entries = Arc::clone(&self.entries);
        let jtis = jtis.to_vec();

        async move {
            let guard = entries.lock().map_err(|_| poisoned())?;
            Ok(jtis.iter().map(|jti| guard.contains_key(jti)).collect())
        }
    }
}
