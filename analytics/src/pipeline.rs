//! Bus consumers feeding the batcher.
//!
//! A delivery is acknowledged once its row is in the batcher's channel, or
//! once it is known to be a duplicate or a poison message. Everything else
//! stays unacknowledged and is redelivered after a restart.

use crate::batcher::{Batcher, BatcherHandle};
use crate::config::IngestConfig;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::providers::ColumnarWriter;
use crate::row::EventRow;
use futures::StreamExt;
use std::sync::Arc;
use travio_core::event_bus::{Delivery, EventBus, EventStream};
use travio_runtime::{CancellationToken, Worker};

/// Running ingest: consumers, dedup reset and batcher.
pub struct IngestPipeline {
    consumers: Vec<Worker>,
    dedup_reset: Worker,
    dedup: Arc<Deduplicator>,
    batcher: Batcher,
}

impl IngestPipeline {
    /// Subscribe `config.consumers` times to `config.topics` and start
    /// writing through `writer`.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidConfig` or the bus's subscription error.
    pub async fn start<W>(bus: Arc<dyn EventBus>, writer: Arc<W>, config: IngestConfig) -> Result<Self>
    where
        W: ColumnarWriter + 'static,
    {
        config.validate()?;
        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();

        let mut streams = Vec::with_capacity(config.consumers);
        for _ in 0..config.consumers {
            streams.push(bus.subscribe(&topics).await?);
        }

        let dedup = Arc::new(Deduplicator::new(config.dedup_capacity));
        let dedup_reset = dedup.spawn_reset(config.dedup_reset_interval);
        let batcher = Batcher::spawn(writer, &config);

        let consumers = streams
            .into_iter()
            .enumerate()
            .map(|(index, stream)| {
                let handle = batcher.handle();
                let dedup = Arc::clone(&dedup);
                Worker::spawn(format!("ingest-consumer-{index}"), move |cancel| {
                    consume(stream, handle, dedup, cancel)
                })
            })
            .collect();

        tracing::info!(
            topics = ?config.topics,
            consumers = config.consumers,
            batch_size = config.batch_size,
            "Ingest pipeline started"
        );
        Ok(Self {
            consumers,
            dedup_reset,
            dedup,
            batcher,
        })
    }

    /// Flush the batcher now.
    ///
    /// # Errors
    ///
    /// Returns the writer's error if the flush failed after retries.
    pub async fn flush(&self) -> Result<usize> {
        self.batcher.handle().flush().await
    }

    /// The shared dedup set.
    #[must_use]
    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Stop consuming, then flush and stop the batcher.
    pub async fn shutdown(self) {
        for consumer in self.consumers {
            consumer.stop().await;
        }
        self.dedup_reset.stop().await;
        self.batcher.shutdown().await;
        tracing::info!("Ingest pipeline stopped");
    }
}

async fn consume(
    mut stream: EventStream,
    batcher: BatcherHandle,
    dedup: Arc<Deduplicator>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(delivery)) => {
                    if !handle_delivery(delivery, &batcher, &dedup).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    metrics::counter!("ingest.consume_errors").increment(1);
                    tracing::warn!(error = %e, "Consumer error");
                }
                None => {
                    tracing::info!("Subscription ended");
                    break;
                }
            }
        }
    }
}

/// Returns `false` once the batcher is gone.
async fn handle_delivery(delivery: Delivery, batcher: &BatcherHandle, dedup: &Deduplicator) -> bool {
    let (topic, partition, offset) = (delivery.topic.clone(), delivery.partition, delivery.offset);
    let (payload, ack) = delivery.into_parts();

    let row = match EventRow::decode(&payload) {
        Ok(row) => row,
        Err(e) => {
            metrics::counter!("ingest.poison_messages").increment(1);
            tracing::warn!(%topic, partition, offset, error = %e, "Dropping unparseable event");
            ack.ack();
            return true;
        }
    };

    if !dedup.first_seen(&row.event_id) {
        metrics::counter!("ingest.duplicates_dropped").increment(1);
        tracing::debug!(event_id = %row.event_id, partition, offset, "Duplicate event");
        ack.ack();
        return true;
    }

    let event_id = row.event_id.clone();
    match batcher.send(row).await {
        Ok(()) => {
            metrics::counter!("ingest.events_consumed").increment(1);
            ack.ack();
            true
        }
        Err(e) => {
            // Left unacknowledged; the redelivery must not look like a duplicate.
            dedup.forget(&event_id);
            tracing::warn!(%event_id, error = %e, "Batcher closed, leaving event unacknowledged");
            false
        }
    }
}
