//! In-memory event bus for tests.
//!
//! Topics are split into a fixed number of partitions. Subscriptions share
//! one consumer group: each partition is served by exactly one subscriber,
//! and a new subscriber replays every message past the committed offset.
//! Acknowledged deliveries advance the committed offset, which tests can
//! inspect with [`InMemoryEventBus::committed_offset`].

use futures::StreamExt;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use travio_core::event_bus::{AckHandle, Delivery, EventBus, EventBusError, EventStream};

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, EventBusError>>;

#[derive(Debug, Clone)]
struct Message {
    key: String,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct Subscriber {
    topics: Vec<String>,
    tx: DeliverySender,
}

#[derive(Debug, Default)]
struct Inner {
    log: HashMap<String, Vec<Vec<Message>>>,
    committed: HashMap<(String, i32), i64>,
    subscribers: Vec<Subscriber>,
}

/// Partitioned in-memory bus.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    partitions: usize,
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryEventBus {
    /// Create a bus whose topics have `partitions` partitions (at least one).
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partitions = u64::try_from(self.partitions).unwrap_or(1);
        i32::try_from(hasher.finish() % partitions).unwrap_or(0)
    }

    /// Append a message to an explicit partition.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the partition does not exist.
    pub fn publish_to_partition(
        &self,
        topic: &str,
        partition: i32,
        key: &str,
        payload: &[u8],
    ) -> Result<i64, EventBusError> {
        let index = usize::try_from(partition)
            .ok()
            .filter(|p| *p < self.partitions)
            .ok_or_else(|| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: format!("partition {partition} out of range"),
            })?;

        let mut inner = self.lock();
        let partitions = inner
            .log
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); self.partitions]);
        let messages = &mut partitions[index];
        messages.push(Message {
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        let offset = i64::try_from(messages.len() - 1).unwrap_or(i64::MAX);
        let message = messages[messages.len() - 1].clone();

        let subscribers: Vec<&Subscriber> = inner
            .subscribers
            .iter()
            .filter(|s| s.topics.iter().any(|t| t == topic))
            .collect();
        if !subscribers.is_empty() {
            let owner = subscribers[index % subscribers.len()];
            let delivery = self.delivery(topic, partition, offset, &message);
            let _ = owner.tx.send(Ok(delivery));
        }

        Ok(offset)
    }

    fn delivery(&self, topic: &str, partition: i32, offset: i64, message: &Message) -> Delivery {
        let inner = Arc::clone(&self.inner);
        let tp = (topic.to_string(), partition);
        let ack = AckHandle::new(move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            let committed = inner.committed.entry(tp).or_insert(0);
            *committed = (*committed).max(offset + 1);
        });
        Delivery::new(
            topic,
            partition,
            offset,
            Some(message.key.clone()),
            message.payload.clone(),
            ack,
        )
    }

    /// Next offset to be consumed for a partition (Kafka commit semantics).
    #[must_use]
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Number of messages appended to a topic across all partitions.
    #[must_use]
    pub fn message_count(&self, topic: &str) -> usize {
        self.lock()
            .log
            .get(topic)
            .map_or(0, |partitions| partitions.iter().map(Vec::len).sum())
    }

    /// End every open subscription stream.
    pub fn close(&self) {
        self.lock().subscribers.clear();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let result = self
            .publish_to_partition(topic, self.partition_for(key), key, payload)
            .map(|_| ());
        Box::pin(async move { result })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            if topics.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "no topics given".to_string(),
                });
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut inner = self.lock();
                for topic in &topics {
                    let Some(partitions) = inner.log.get(topic) else {
                        continue;
                    };
                    for (index, messages) in partitions.iter().enumerate() {
                        let partition = i32::try_from(index).unwrap_or(i32::MAX);
                        let from = inner
                            .committed
                            .get(&(topic.clone(), partition))
                            .copied()
                            .unwrap_or(0);
                        for (offset, message) in messages.iter().enumerate() {
                            let offset = i64::try_from(offset).unwrap_or(i64::MAX);
                            if offset >= from {
                                let _ = tx.send(Ok(self.delivery(topic, partition, offset, message)));
                            }
                        }
                    }
                }
                inner.subscribers.push(Subscriber { topics, tx });
            }

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(stream.boxed())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_published_messages_and_commits_on_ack() {
        let bus = InMemoryEventBus::new(2);
        let mut stream = bus.subscribe(&["travio.events"]).await.unwrap();

        let offset = bus.publish_to_partition("travio.events", 1, "k", b"one").unwrap();
        assert_eq!(offset, 0);

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.partition, 1);
        assert_eq!(delivery.payload, b"one");
        assert_eq!(bus.committed_offset("travio.events", 1), None);

        delivery.ack();
        assert_eq!(bus.committed_offset("travio.events", 1), Some(1));
    }

    #[tokio::test]
    async fn replays_uncommitted_messages_to_new_subscribers() {
        let bus = InMemoryEventBus::new(1);
        bus.publish("travio.events", "a", b"first").await.unwrap();
        bus.publish("travio.events", "a", b"second").await.unwrap();

        let mut first = bus.subscribe(&["travio.events"]).await.unwrap();
        first.next().await.unwrap().unwrap().ack();
        bus.close();

        let mut second = bus.subscribe(&["travio.events"]).await.unwrap();
        let replayed = second.next().await.unwrap().unwrap();
        assert_eq!(replayed.payload, b"second");
        assert_eq!(bus.message_count("travio.events"), 2);
    }

    #[tokio::test]
    async fn close_ends_streams() {
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe(&["t"]).await.unwrap();
        bus.close();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn rejects_unknown_partition() {
        let bus = InMemoryEventBus::new(2);
        assert!(bus.publish_to_partition("t", 2, "k", b"x").is_err());
    }
}
