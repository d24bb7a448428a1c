//! Ordered offset commits.
//!
//! Deliveries of one partition may be acknowledged out of order (the
//! consumer hands rows to a batcher concurrently). A partition's commit
//! position only advances past offsets that are acknowledged **and** have
//! no unacknowledged offset below them, so a crash can never skip an
//! unprocessed message.

use std::collections::{BTreeSet, HashMap};

/// Topic and partition of a message.
pub type TopicPartition = (String, i32);

#[derive(Debug, Default)]
struct PartitionState {
    outstanding: BTreeSet<i64>,
    acked: BTreeSet<i64>,
}

/// Tracks delivered and acknowledged offsets per partition.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<TopicPartition, PartitionState>,
}

impl OffsetTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `offset` was handed to the subscriber.
    pub fn delivered(&mut self, topic: &str, partition: i32, offset: i64) {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
            .outstanding
            .insert(offset);
    }

    /// Record an acknowledgement. Returns the next offset to commit (Kafka
    /// semantics: one past the last processed message) when the commit
    /// position advanced.
    pub fn acked(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partitions.get_mut(&(topic.to_string(), partition))?;
        if !state.outstanding.contains(&offset) {
            return None;
        }
        state.acked.insert(offset);

        let mut commit = None;
        while let Some(&lowest) = state.outstanding.first() {
            if !state.acked.remove(&lowest) {
                break;
            }
            state.outstanding.remove(&lowest);
            commit = Some(lowest + 1);
        }
        commit
    }

    /// Delivered but not yet committable offsets across all partitions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.partitions.values().map(|s| s.outstanding.len()).sum()
    }
}
