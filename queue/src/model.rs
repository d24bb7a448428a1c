//! Waiting-room data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a queue entry.
///
/// ```text
/// waiting ──admit──► ready ──consume──► completed
///    └──────ttl──────┴──────► expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// In the waiting set.
    Waiting,
    /// Admitted; holds a ticket.
    Ready,
    /// Gone from the waiting set without admission, or past its ttl.
    Expired,
    /// Ticket consumed.
    Completed,
}

/// One user's place in an event's waiting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry id.
    pub id: String,
    /// User.
    pub user_id: String,
    /// Client session that joined.
    pub session_id: String,
    /// Event.
    pub event_id: String,
    /// 1-based position; derived on read, 0 once admitted.
    pub position: u64,
    /// Admission ticket once ready.
    pub token: Option<String>,
    /// Join time.
    pub joined_at: DateTime<Utc>,
    /// Estimated wait in seconds at the time of the read.
    pub estimated_wait_secs: u64,
    /// Lifecycle state.
    pub status: EntryStatus,
    /// When the entry (or its ticket) lapses.
    pub expires_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Whether the entry has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Whether a join created a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    /// First join.
    New,
    /// The user was already queued or admitted; the prior entry is returned.
    Existing,
}

/// Result of a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    /// Current entry.
    pub entry: QueueEntry,
    /// 1-based position, 0 when admitted.
    pub position: u64,
    /// New or existing.
    pub status: JoinStatus,
}

/// Server-side value of an admission ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Admitted user.
    pub user_id: String,
    /// Event admitted to.
    pub event_id: String,
    /// Expiry mirrored from the cache ttl.
    pub expires_at: DateTime<Utc>,
}

/// One user released by an admission tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// User.
    pub user_id: String,
    /// Freshly minted ticket.
    pub ticket: String,
}

/// Queue statistics of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Event.
    pub event_id: String,
    /// Users currently waiting.
    pub total_waiting: u64,
    /// Users admitted since the queue was created.
    pub total_admitted: u64,
    /// Admission throughput at the current configuration.
    pub admission_rate_per_min: f64,
    /// Estimated wait in seconds for the last user in line.
    pub estimated_wait_secs: u64,
}
