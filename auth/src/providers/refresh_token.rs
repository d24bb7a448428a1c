//! Refresh-token record repository trait.
//!
//! # Linearisation
//!
//! Rotation must be linearised per record. Implementations perform the
//! revoke as a compare-and-swap on `revoked = false` and insert the child
//! record in the same transaction, so two concurrent rotations of the same
//! token can never both succeed.

use crate::error::Result;
use crate::model::{RefreshTokenRecord, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Result of an attempted rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// Parent revoked and child persisted.
    Rotated,
    /// Parent was already revoked (or gone); nothing was written.
    AlreadyRevoked,
}

/// Persistent refresh-token records.
pub trait RefreshTokenRepository: Send + Sync {
    /// Persist a newly issued record.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn create(&self, record: &RefreshTokenRecord) -> impl Future<Output = Result<()>> + Send;

    /// Look a record up by id (jti).
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn find(&self, id: &str) -> impl Future<Output = Result<Option<RefreshTokenRecord>>> + Send;

    /// Atomically revoke `parent_id` (only if not yet revoked) and insert `child`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure; in that case
    /// neither write took effect.
    fn rotate(
        &self,
        parent_id: &str,
        child: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<RotateOutcome>> + Send;

    /// Revoke one record. Returns whether a record was changed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn revoke(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Revoke every record of a family. Returns the number changed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn revoke_family(&self, family_id: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Revoke every record of a user. Returns the number changed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn revoke_all_for_user(&self, user_id: UserId) -> impl Future<Output = Result<u64>> + Send;

    /// Non-revoked, unexpired records of a user, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RefreshTokenRecord>>> + Send;

    /// Delete records that expired before `now`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn delete_expired(&self, now: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send;
}
