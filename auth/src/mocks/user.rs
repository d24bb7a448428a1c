//! Mock user repository for testing.

use crate::error::{IdentityError, Result};
use crate::model::{User, UserId};
use crate::providers::UserRepository;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Mock user repository.
///
/// Uses in-memory storage keyed by id, with a secondary email index.
#[derive(Debug, Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<HashMap<UserId, User>>>,
    ids_by_email: Arc<Mutex<HashMap<String, UserId>>>,
}

impl MockUserRepository {
    /// Create a new mock user repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().map_or(0, |users| users.len())
    }

    /// Whether no user is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> IdentityError {
    IdentityError::Internal("mock user store poisoned".to_string())
}

impl UserRepository for MockUserRepository {
    fn create(&self, user: &User) -> impl Future<Output = Result<()>> + Send {
        let users = Arc::clone(&self.users);
        let ids_by_email = Arc::clone(&self.ids_by_email);
        let user = user.clone();

        async move {
            let mut users_guard = users.lock().map_err(|_| poisoned())?;
            let mut email_guard = ids_by_email.lock().map_err(|_| poisoned())?;

            let email_key = user.email.to_lowercase();
            if email_guard.contains_key(&email_key) {
                return Err(IdentityError::AlreadyExists);
            }

            email_guard.insert(email_key, user.id);
            users_guard.insert(user.id, user);
            Ok(())
        }
    }

    fn find_by_email(&self, email: &str) -> impl Future<Output = Result<Option<User>>> + Send {
        let users = Arc::clone(&self.users);
        let ids_by_email = Arc::clone(&self.ids_by_email);
        let email_key = email.to_lowercase();

        async move {
            let id = ids_by_email.lock().map_err(|_| poisoned())?.get(&email_key).copied();
            let Some(id) = id else {
                return Ok(None);
            };
            Ok(users.lock().map_err(|_| poisoned())?.get(&id).cloned())
        }
    }

    fn find_by_id(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send {
        let users = Arc::clone(&self.users);

        async move { Ok(users.lock().map_err(|_| poisoned())?.get(&id).cloned()) }
    }
}
