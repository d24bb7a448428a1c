//! In-memory queue store for testing.
//!
//! One mutex guards all state, so every operation is atomic like the Redis
//! scripts it stands in for. Ttls are not enforced here; the controller
//! checks `expires_at` itself.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::model::{Admitted, EntryStatus, JoinStatus, QueueEntry, Ticket};
use crate::providers::{Enqueued, QueueStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    /// Waiting sets: `(score, user)` kept sorted by score then insertion.
    queues: HashMap<String, Vec<(f64, String)>>,
    entries: HashMap<(String, String), QueueEntry>,
    tickets: HashMap<String, Ticket>,
    admitted: HashMap<String, u64>,
    configs: HashMap<String, QueueConfig>,
}

/// Mock queue store.
#[derive(Debug, Clone, Default)]
pub struct MockQueueStore {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl MockQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a cache outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live tickets.
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.tickets.len())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Cache("connection refused".to_string()));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::Cache("mock queue store poisoned".to_string()))?;
        f(&mut state)
    }
}

fn position_of(queue: &[(f64, String)], user_id: &str) -> Option<u64> {
    queue
        .iter()
        .position(|(_, user)| user == user_id)
        .and_then(|idx| u64::try_from(idx).ok())
}

impl QueueStore for MockQueueStore {
    async fn enqueue(&self, entry: &QueueEntry, score: f64, _entry_ttl: Duration) -> Result<Enqueued> {
        self.with_state(|state| {
            let queue = state.queues.entry(entry.event_id.clone()).or_default();
            let status = if position_of(queue, &entry.user_id).is_some() {
                JoinStatus::Existing
            } else {
                let at = queue.partition_point(|(s, _)| *s <= score);
                queue.insert(at, (score, entry.user_id.clone()));
                JoinStatus::New
            };
            let rank = position_of(queue, &entry.user_id).unwrap_or(0);

            let key = (entry.event_id.clone(), entry.user_id.clone());
            if status == JoinStatus::New || !state.entries.contains_key(&key) {
                state.entries.insert(key, entry.clone());
            }
            Ok(Enqueued { status, rank })
        })
    }

    async fn entry(&self, event_id: &str, user_id: &str) -> Result<Option<QueueEntry>> {
        self.with_state(|state| {
            Ok(state
                .entries
                .get(&(event_id.to_string(), user_id.to_string()))
                .cloned())
        })
    }

    async fn rank(&self, event_id: &str, user_id: &str) -> Result<Option<u64>> {
        self.with_state(|state| {
            Ok(state
                .queues
                .get(event_id)
                .and_then(|queue| position_of(queue, user_id)))
        })
    }

    async fn remove(&self, event_id: &str, user_id: &str) -> Result<()> {
        self.with_state(|state| {
            if let Some(queue) = state.queues.get_mut(event_id) {
                queue.retain(|(_, user)| user != user_id);
            }
            state
                .entries
                .remove(&(event_id.to_string(), user_id.to_string()));
            Ok(())
        })
    }

    async fn admit(
        &self,
        event_id: &str,
        tickets: &[String],
        _ticket_ttl: Duration,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<Admitted>> {
        self.with_state(|state| {
            let queue = state.queues.entry(event_id.to_string()).or_default();
            let count = tickets.len().min(queue.len());
            let popped: Vec<String> = queue.drain(..count).map(|(_, user)| user).collect();

            let mut admitted = Vec::with_capacity(popped.len());
            for (user_id, ticket) in popped.into_iter().zip(tickets) {
                state.tickets.insert(
                    ticket.clone(),
                    Ticket {
                        user_id: user_id.clone(),
                        event_id: event_id.to_string(),
                        expires_at,
                    },
                );
                if let Some(entry) = state
                    .entries
                    .get_mut(&(event_id.to_string(), user_id.clone()))
                {
                    entry.status = EntryStatus::Ready;
                    entry.token = Some(ticket.clone());
                    entry.position = 0;
                    entry.estimated_wait_secs = 0;
                    entry.expires_at = expires_at;
                }
                admitted.push(Admitted {
                    user_id,
                    ticket: ticket.clone(),
                });
            }

            *state.admitted.entry(event_id.to_string()).or_default() += admitted.len() as u64;
            Ok(admitted)
        })
    }

    async fn ticket(&self, ticket: &str) -> Result<Option<Ticket>> {
        self.with_state(|state| Ok(state.tickets.get(ticket).cloned()))
    }

    async fn consume(&self, ticket: &str) -> Result<Option<Ticket>> {
        self.with_state(|state| {
            let Some(removed) = state.tickets.remove(ticket) else {
                return Ok(None);
            };
            if let Some(entry) = state
                .entries
                .get_mut(&(removed.event_id.clone(), removed.user_id.clone()))
            {
                entry.status = EntryStatus::Completed;
            }
            Ok(Some(removed))
        })
    }

    async fn waiting_count(&self, event_id: &str) -> Result<u64> {
        self.with_state(|state| {
            Ok(state
                .queues
                .get(event_id)
                .map_or(0, |queue| queue.len() as u64))
        })
    }

    async fn admitted_count(&self, event_id: &str) -> Result<u64> {
        self.with_state(|state| Ok(state.admitted.get(event_id).copied().unwrap_or(0)))
    }

    async fn save_config(&self, config: &QueueConfig) -> Result<()> {
        self.with_state(|state| {
            state.configs.insert(config.event_id.clone(), config.clone());
            Ok(())
        })
    }

    async fn load_config(&self, event_id: &str) -> Result<Option<QueueConfig>> {
        self.with_state(|state| Ok(state.configs.get(event_id).cloned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn entry(event: &str, user: &str) -> QueueEntry {
        let now = Utc::now();
        QueueEntry {
            id: user.to_string(),
            user_id: user.to_string(),
            session_id: "s".to_string(),
            event_id: event.to_string(),
            position: 0,
            token: None,
            joined_at: now,
            estimated_wait_secs: 0,
            status: EntryStatus::Waiting,
            expires_at: now,
        }
    }

    #[tokio::test]
    async fn repeated_enqueue_keeps_first_score() {
        let store = MockQueueStore::new();
        let ttl = Duration::from_secs(60);
        store.enqueue(&entry("e", "a"), 1.0, ttl).await.unwrap();
        store.enqueue(&entry("e", "b"), 2.0, ttl).await.unwrap();

        let again = store.enqueue(&entry("e", "a"), 3.0, ttl).await.unwrap();
        assert_eq!(again.status, JoinStatus::Existing);
        assert_eq!(again.rank, 0);
        assert_eq!(store.rank("e", "b").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let store = MockQueueStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.waiting_count("e").await, Err(QueueError::Cache(_))));
    }
}
