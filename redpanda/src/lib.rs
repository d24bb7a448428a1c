//! Redpanda event bus for Travio.
//!
//! Implements [`EventBus`] from `travio-core` over rdkafka, so it works
//! against Redpanda or any Kafka-compatible broker.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual, ordered offset commits:
//!
//! ```text
//!  StreamConsumer ──► Delivery ──► subscriber ──► ack()
//!        ▲                                          │
//!        │            OffsetTracker ◄───────────────┘
//!        │                 │
//!        └──── commit(next contiguous offset) ◄─────┘
//! ```
//!
//! - auto-commit is disabled
//! - an offset is committed only after its delivery, and every delivery
//!   before it on the same partition, was acknowledged
//! - a delivery dropped without `ack()` is redelivered after restart
//! - ordering holds within a partition; the publish key picks the partition
//!
//! # Example
//!
//! ```no_run
//! use travio_redpanda::RedpandaEventBus;
//! use travio_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("reporting-service")
//!     .build()?;
//!
//! bus.publish("travio.events", "ord_1", br#"{"id":"e1"}"#).await?;
//!
//! let mut stream = bus.subscribe(&["travio.events"]).await?;
//! while let Some(delivery) = stream.next().await {
//!     let delivery = delivery?;
//!     // ...hand the payload off, then:
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod offsets;

use futures::StreamExt;
use offsets::OffsetTracker;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use travio_core::event_bus::{AckHandle, Delivery, EventBus, EventBusError, EventStream};

/// Default number of deliveries buffered per subscription.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Acknowledged (topic, partition, offset).
type Ack = (String, i32, i64);

/// Redpanda event bus.
///
/// Holds one producer; each [`subscribe`](EventBus::subscribe) call creates
/// its own consumer in the configured group, so several subscriptions
/// split the topic's partitions between them.
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker list this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("travio-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaEventBus`].
///
/// ```no_run
/// use travio_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .timeout(Duration::from_secs(10))
///     .auto_offset_reset("earliest")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated bootstrap servers.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer `acks`: `"0"`, `"1"` or `"all"`. Default `"all"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `none`, `gzip`, `snappy`, `lz4`, `zstd`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default 5 s.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by every subscription of this bus.
    ///
    /// Without one, the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Deliveries buffered between the consumer and the subscriber.
    /// Zero is treated as one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new group starts reading: `earliest`, `latest` or `error`.
    /// Default `earliest`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Create the producer.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no brokers were set or
    /// rdkafka rejects the configuration.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let bus = RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        };

        tracing::info!(
            brokers = %bus.brokers,
            acks = %acks,
            compression = %compression,
            buffer_size = bus.buffer_size,
            auto_offset_reset = %bus.auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(bus)
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let record = FutureRecord::to(&topic).payload(&payload).key(&key);
            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, partition, offset, "Message published");
                    Ok(())
                },
                Err((e, _)) => {
                    tracing::error!(topic = %topic, error = %e, "Failed to publish message");
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: e.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason,
            };

            if topics.is_empty() {
                return Err(subscription_failed("no topics given".to_string()));
            }

            let group = self.group_for(&topics);
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group,
                buffer_size = self.buffer_size,
                "Subscribed to topics"
            );

            let (tx, mut rx) = mpsc::channel(self.buffer_size);
            tokio::spawn(run_consumer(consumer, tx));

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(stream.boxed())
        })
    }
}

/// Owns the consumer: forwards messages as deliveries and commits
/// acknowledged offsets in order. Exits when the subscriber drops its
/// stream.
async fn run_consumer(
    consumer: StreamConsumer,
    tx: mpsc::Sender<Result<Delivery, EventBusError>>,
) {
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();
    let mut tracker = OffsetTracker::new();
    let mut messages = consumer.stream();

    loop {
        tokio::select! {
            Some((topic, partition, offset)) = ack_rx.recv() => {
                if let Some(next) = tracker.acked(&topic, partition, offset) {
                    commit(&consumer, &topic, partition, next);
                }
            }
            message = messages.next() => {
                let Some(message) = message else { break };
                let item = match message {
                    Ok(message) => {
                        let topic = message.topic().to_string();
                        let (partition, offset) = (message.partition(), message.offset());
                        tracker.delivered(&topic, partition, offset);

                        let ack_tx = ack_tx.clone();
                        let ack_topic = topic.clone();
                        let ack = AckHandle::new(move || {
                            let _ = ack_tx.send((ack_topic, partition, offset));
                        });
                        let key = message
                            .key()
                            .map(|k| String::from_utf8_lossy(k).into_owned());
                        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

                        tracing::trace!(topic = %topic, partition, offset, "Message received");
                        Ok(Delivery::new(topic, partition, offset, key, payload, ack))
                    },
                    Err(e) => Err(EventBusError::TransportError(format!(
                        "Failed to receive message: {e}"
                    ))),
                };

                if tx.send(item).await.is_err() {
                    tracing::debug!("Subscriber dropped, stopping consumer");
                    break;
                }
            }
        }
    }

    // Commit whatever was acknowledged before the subscriber went away.
    while let Ok((topic, partition, offset)) = ack_rx.try_recv() {
        if let Some(next) = tracker.acked(&topic, partition, offset) {
            commit(&consumer, &topic, partition, next);
        }
    }
    tracing::debug!(uncommitted = tracker.pending(), "Consumer task exiting");
}

fn commit(consumer: &StreamConsumer, topic: &str, partition: i32, next: i64) {
    let mut offsets = TopicPartitionList::new();
    let result = offsets
        .add_partition_offset(topic, partition, Offset::Offset(next))
        .and_then(|()| consumer.commit(&offsets, CommitMode::Async));
    if let Err(e) = result {
        tracing::warn!(
            topic = %topic,
            partition,
            offset = next,
            error = %e,
            "Failed to commit offset (messages may be redelivered)"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_requires_brokers() {
        assert!(matches!(
            RedpandaEventBus::builder().build(),
            Err(EventBusError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn group_defaults_to_sorted_topics() {
        let bus = RedpandaEventBus::new("localhost:9092").unwrap();
        let topics = vec!["travio.orders".to_string(), "travio.events".to_string()];
        assert_eq!(bus.group_for(&topics), "travio-travio.events-travio.orders");

        let bus = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("reporting-service")
            .build()
            .unwrap();
        assert_eq!(bus.group_for(&topics), "reporting-service");
    }
}
