//! User repository trait.

use crate::error::Result;
use crate::model::{User, UserId};
use std::future::Future;

/// Persistent user accounts.
pub trait UserRepository: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::AlreadyExists` if the (normalised) email is
    /// taken, or `IdentityError::Database` on store failure.
    fn create(&self, user: &User) -> impl Future<Output = Result<()>> + Send;

    /// Find a user by normalised email.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn find_by_email(&self, email: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Database` on store failure.
    fn find_by_id(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;
}
