//! Queue storage trait.
//!
//! All waiting-room state lives behind [`QueueStore`]. The key layout of
//! the Redis implementation is the contract other services read:
//!
//! ```text
//! queue:<event>               ZSET  user ids scored by join time
//! queue:<event>:entry:<user>  STR   entry JSON (entry ttl, then ticket ttl)
//! queue:<event>:stats         HASH  admitted counter
//! queue:<event>:config        STR   QueueConfig JSON
//! queue:token:<ticket>        STR   Ticket JSON (ticket ttl)
//! ```

use crate::config::QueueConfig;
use crate::error::Result;
use crate::model::{Admitted, JoinStatus, QueueEntry, Ticket};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Whether the user was newly added to the waiting set.
    pub status: JoinStatus,
    /// 0-based rank in the waiting set.
    pub rank: u64,
}

/// Storage for waiting sets, entries, tickets and per-event config.
pub trait QueueStore: Send + Sync {
    /// Add `entry.user_id` to the waiting set with `score` unless already
    /// present (existing score preserved), and write the entry blob when
    /// the user is new or its blob has lapsed.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn enqueue(
        &self,
        entry: &QueueEntry,
        score: f64,
        entry_ttl: Duration,
    ) -> impl Future<Output = Result<Enqueued>> + Send;

    /// Read the entry blob of a user.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn entry(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<QueueEntry>>> + Send;

    /// 0-based rank of a user in the waiting set.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn rank(&self, event_id: &str, user_id: &str) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Remove a user from the waiting set and delete the entry blob.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn remove(&self, event_id: &str, user_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically pop up to `tickets.len()` users from the front of the
    /// waiting set, store one ticket per popped user with `ticket_ttl`,
    /// rewrite each entry to `ready`, and add the count to the admitted
    /// counter.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure; nothing is popped.
    fn admit(
        &self,
        event_id: &str,
        tickets: &[String],
        ticket_ttl: Duration,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Admitted>>> + Send;

    /// Read a ticket without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn ticket(&self, ticket: &str) -> impl Future<Output = Result<Option<Ticket>>> + Send;

    /// Delete a ticket and mark its entry `completed`. Returns the ticket
    /// if it existed.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn consume(&self, ticket: &str) -> impl Future<Output = Result<Option<Ticket>>> + Send;

    /// Number of users waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn waiting_count(&self, event_id: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Value of the admitted counter.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn admitted_count(&self, event_id: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Persist an event's configuration.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn save_config(&self, config: &QueueConfig) -> impl Future<Output = Result<()>> + Send;

    /// Load an event's configuration.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` on cache failure.
    fn load_config(&self, event_id: &str) -> impl Future<Output = Result<Option<QueueConfig>>> + Send;
}
