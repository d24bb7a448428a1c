//! Best-effort in-memory deduplication of event ids.
//!
//! The set only bounds duplicates within one process lifetime and one
//! reset interval. The `events` table's `ReplacingMergeTree` engine is what
//! makes ingest idempotent across restarts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use travio_runtime::Worker;

/// Recently seen event ids.
#[derive(Debug)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
    capacity: usize,
}

impl Deduplicator {
    /// Create a set that clears itself once it holds `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record `event_id`; `true` if it was not seen before.
    pub fn first_seen(&self, event_id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(event_id) {
            return false;
        }
        if seen.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "Dedup set full, clearing early");
            seen.clear();
        }
        seen.insert(event_id.to_string());
        true
    }

    /// Drop `event_id` so a redelivery is processed again.
    pub fn forget(&self, event_id: &str) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_id);
    }

    /// Empty the set.
    pub fn clear(&self) {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Number of ids held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no ids are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the set every `interval` until stopped.
    #[must_use]
    pub fn spawn_reset(self: &Arc<Self>, interval: Duration) -> Worker {
        let dedup = Arc::clone(self);
        Worker::spawn("ingest-dedup-reset", move |cancel| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let cleared = dedup.len();
                        dedup.clear();
                        tracing::debug!(cleared, "Dedup set cleared");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_a_duplicate() {
        let dedup = Deduplicator::new(10);
        assert!(dedup.first_seen("a"));
        assert!(!dedup.first_seen("a"));
        dedup.forget("a");
        assert!(dedup.first_seen("a"));
    }

    #[test]
    fn full_set_clears_before_inserting() {
        let dedup = Deduplicator::new(2);
        assert!(dedup.first_seen("a"));
        assert!(dedup.first_seen("b"));
        assert!(dedup.first_seen("c"));
        assert_eq!(dedup.len(), 1);
        assert!(dedup.first_seen("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_worker_clears_periodically() {
        let dedup = Arc::new(Deduplicator::new(100));
        dedup.first_seen("a");
        let worker = dedup.spawn_reset(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(dedup.len(), 1);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(dedup.is_empty());
        worker.stop().await;
    }
}
