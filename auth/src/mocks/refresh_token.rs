//! Mock refresh-token repository for testing.
//!
//! Rotation holds the store lock across the compare-and-swap and the child
//! insert, matching the transactional behaviour of the PostgreSQL store.

use crate::error::{IdentityError, Result};
use crate::model::{RefreshTokenRecord, UserId};
use crate::providers::{RefreshTokenRepository, RotateOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock refresh-token repository.
#[derive(Debug, Clone, Default)]
pub struct MockRefreshTokenRepository {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockRefreshTokenRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RefreshTokenRecord> {
        self.records.lock().ok().and_then(|records| records.get(id).cloned())
    }

    /// Snapshot of every record in a family.
    #[must_use]
    pub fn family(&self, family_id: &str) -> Vec<RefreshTokenRecord> {
        self.records.lock().map_or_else(
            |_| Vec::new(),
            |records| {
                records
                    .values()
                    .filter(|r| r.family_id == family_id)
                    .cloned()
                    .collect()
            },
        )
    }

    /// Total number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> IdentityError {
    IdentityError::Database("mock refresh store poisoned".to_string())
}

fn write_failure() -> IdentityError {
    IdentityError::Database("injected write failure".to_string())
}

impl RefreshTokenRepository for MockRefreshTokenRepository {
    fn create(&self, record: &RefreshTokenRecord) -> impl Future<Output = Result<()>> + Send {
        let records = Arc::clone(&self.records);
        let fail = self.fail_writes.load(Ordering::SeqCst);
        let record = record.clone();

        async move {
            if fail {
                return Err(write_failure());
            }
            records.lock().map_err(|_| poisoned())?.insert(record.id.clone(), record);
            Ok(())
        }
    }

    fn find(&self, id: &str) -> impl Future<Output = Result<Option<RefreshTokenRecord>>> + Send {
        let records = Arc::clone(&self.records);
        let id = id.to_string();

        async move { Ok(records.lock().map_err(|_| poisoned())?.get(&id).cloned()) }
    }

    fn rotate(
        &self,
        parent_id: &str,
        child: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<RotateOutcome>> + Send {
        let records = Arc::clone(&self.records);
        let fail = self.fail_writes.load(Ordering::SeqCst);
        let parent_id = parent_id.to_string();
        let child = child.clone();

        async move {
            if fail {
                return Err(write_failure());
            }
            let mut guard = records.lock().map_err(|_| poisoned())?;
            match guard.get_mut(&parent_id) {
                Some(parent) if !parent.revoked => {
                    parent.revoked = true;
                    parent.last_used_at = now;
                }
                _ => return Ok(RotateOutcome::AlreadyRevoked),
            }
            guard.insert(child.id.clone(), child);
            Ok(RotateOutcome::Rotated)
        }
    }

    fn revoke(&self, id: &str) -> impl Future<Output = Result<bool>> + Send {
        let records = Arc::clone(&self.records);
        let id = id.to_string();

        async move {
            let mut guard = records.lock().map_err(|_| poisoned())?;
            Ok(match guard.get_mut(&id) {
                Some(record) if !record.revoked => {
                    record.revoked = true;
                    true
                }
                _ => false,
            })
        }
    }

    fn revoke_family(&self, family_id: &str) -> impl Future<Output = Result<u64>> + Send {
        let records = Arc::clone(&self.records);
        let family_id = family_id.to_string();

        async move {
            let mut guard = records.lock().map_err(|_| poisoned())?;
            let mut changed = 0;
            for record in guard.values_mut() {
                if record.family_id == family_id && !record.revoked {
                    record.revoked = true;
                    changed += 1;
                }
            }
            Ok(changed)
        }
    }

    fn revoke_all_for_user(&self, user_id: UserId) -> impl Future<Output = Result<u64>> + Send {
        let records = Arc::clone(&self.records);

        async move {
            let mut guard = records.lock().map_err(|_| poisoned())?;
            let mut changed = 0;
            for record in guard.values_mut() {
                if record.user_id == user_id && !record.revoked {
                    record.revoked = true;
                    changed += 1;
                }
            }
            Ok(changed)
        }
    }

    fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RefreshTokenRecord>>> + Send {
        let records = Arc::clone(&self.records);

        async move {
            let mut active: Vec<RefreshTokenRecord> = records
                .lock()
                .map_err(|_| poisoned())?
                .values()
                .filter(|r| r.user_id == user_id && r.is_active(now))
                .cloned()
                .collect();
            active.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
            Ok(active)
        }
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send {
        let records = Arc::clone(&self.records);

        async move {
            let mut guard = records.lock().map_err(|_| poisoned())?;
            let before = guard.len();
            guard.retain(|_, r| r.expires_at > now);
            Ok((before - guard.len()) as u64)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, family: &str, now: DateTime<Utc>) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: id.to_string(),
            user_id: UserId::new(),
            family_id: family.to_string(),
            token_hash: String::new(),
            revoked: false,
            expires_at: now + Duration::days(7),
            created_at: now,
            last_used_at: now,
            user_agent: String::new(),
            ip_address: String::new(),
        }
    }

    #[tokio::test]
    async fn second_rotation_of_same_parent_loses() {
        let repo = MockRefreshTokenRepository::new();
        let now = Utc::now();
        repo.create(&record("r1", "r1", now)).await.unwrap();

        let first = repo.rotate("r1", &record("r2", "r1", now), now).await.unwrap();
        let second = repo.rotate("r1", &record("r3", "r1", now), now).await.unwrap();

        assert_eq!(first, RotateOutcome::Rotated);
        assert_eq!(second, RotateOutcome::AlreadyRevoked);
        assert!(repo.get("r3").is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_parent_untouched() {
        let repo = MockRefreshTokenRepository::new();
        let now = Utc::now();
        repo.create(&record("r1", "r1", now)).await.unwrap();

        repo.set_fail_writes(true);
        assert!(repo.rotate("r1", &record("r2", "r1", now), now).await.is_err());
        assert!(!repo.get("r1").unwrap().revoked);
    }

    #[tokio::test]
    async fn delete_expired_only_removes_past_records() {
        let repo = MockRefreshTokenRepository::new();
        let now = Utc::now();
        let mut old = record("old", "old", now);
        old.expires_at = now - Duration::seconds(1);
        repo.create(&old).await.unwrap();
        repo.create(&record("new", "new", now)).await.unwrap();

        assert_eq!(repo.delete_expired(now).await.unwrap(), 1);
        assert!(repo.get("new").is_some());
    }
}
