//! Event bus abstraction with explicit acknowledgement.
//!
//! The bus delivers raw message bytes together with an [`AckHandle`]. A
//! consumer acknowledges a [`Delivery`] once it has taken responsibility for
//! the message (for the ingest path: once the row has been handed to the
//! batcher, or the message was deliberately dropped). Implementations commit
//! offsets only for acknowledged deliveries, and in delivery order, which
//! yields at-least-once processing.
//!
//! ```text
//!  broker ──► Delivery ──► consumer ──► batcher channel
//!                 │                          │
//!                 └──────── ack() ◄──────────┘
//!                              │
//!                              ▼
//!                     offset committed
//! ```
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `travio-testing`: partitioned, records commits
//! - `RedpandaEventBus` in `travio-redpanda`: Kafka-compatible consumer group
//!
//! # Dyn Compatibility
//!
//! The trait returns `Pin<Box<dyn Future>>` so it can be used as
//! `Arc<dyn EventBus>`.

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to commit a consumed offset
    #[error("Commit failed for {topic}/{partition}@{offset}: {reason}")]
    CommitFailed {
        /// Topic of the message
        topic: String,
        /// Partition of the message
        partition: i32,
        /// Offset of the message
        offset: i64,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

impl EventBusError {
    /// Classify into the shared error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> crate::ErrorKind {
        crate::ErrorKind::ProviderUnavailable
    }
}

/// Callback invoked when a delivery is acknowledged.
type AckFn = Box<dyn FnOnce() + Send + 'static>;

/// Acknowledgement handle attached to a [`Delivery`].
///
/// Dropping the handle without calling [`AckHandle::ack`] leaves the message
/// uncommitted, so it is redelivered after a rebalance or restart.
pub struct AckHandle {
    on_ack: Option<AckFn>,
}

impl AckHandle {
    /// Create a handle that runs `on_ack` when acknowledged.
    #[must_use]
    pub fn new(on_ack: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_ack: Some(Box::new(on_ack)),
        }
    }

    /// A handle whose acknowledgement does nothing.
    #[must_use]
    pub const fn noop() -> Self {
        Self { on_ack: None }
    }

    /// Acknowledge the delivery.
    pub fn ack(mut self) {
        if let Some(on_ack) = self.on_ack.take() {
            on_ack();
        }
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("pending", &self.on_ack.is_some())
            .finish()
    }
}

/// A single message received from the bus.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Message key, if any.
    pub key: Option<String>,
    /// Raw message payload.
    pub payload: Vec<u8>,
    ack: AckHandle,
}

impl Delivery {
    /// Create a delivery.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<String>,
        payload: Vec<u8>,
        ack: AckHandle,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key,
            payload,
            ack,
        }
    }

    /// Split into the payload bytes and the acknowledgement handle.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, AckHandle) {
        (self.payload, self.ack)
    }

    /// Acknowledge without inspecting the payload.
    pub fn ack(self) {
        self.ack.ack();
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Delivery is at-least-once and ordered within a partition. Subscribers
/// must be idempotent.
pub trait EventBus: Send + Sync {
    /// Publish raw bytes to a topic.
    ///
    /// The key selects the partition, so events for the same aggregate keep
    /// their relative order.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// Subscriptions created by the same bus share a consumer group, so
    /// partitions are spread across them.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn ack_runs_callback_once() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let delivery = Delivery::new(
            "travio.events",
            0,
            7,
            None,
            b"{}".to_vec(),
            AckHandle::new(move || flag.store(true, Ordering::SeqCst)),
        );

        let (payload, ack) = delivery.into_parts();
        assert_eq!(payload, b"{}");
        assert!(!fired.load(Ordering::SeqCst));
        ack.ack();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn dropped_handle_does_not_ack() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        drop(AckHandle::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
