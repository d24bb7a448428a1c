//! In-process batching in front of the columnar writer.
//!
//! One task owns the buffer; consumers reach it through a bounded channel,
//! so the buffer needs no lock. The task flushes when:
//!
//! - the buffer reaches `batch_size`
//! - `flush_interval` elapses with rows buffered
//! - [`BatcherHandle::flush`] is called
//! - [`Batcher::shutdown`] is called (final flush, awaited)
//!
//! A failed flush is retried with the configured [`RetryPolicy`]. When the
//! retries are exhausted the rows stay buffered for the next trigger; past
//! `max_buffered` the oldest rows are dropped.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::providers::ColumnarWriter;
use crate::row::EventRow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use travio_runtime::{RetryPolicy, Worker, retry_with_predicate};

enum Command {
    Row(EventRow),
    Flush(oneshot::Sender<Result<usize>>),
}

/// Sending side of a batcher, cloned into every consumer.
#[derive(Clone)]
pub struct BatcherHandle {
    tx: mpsc::Sender<Command>,
}

impl BatcherHandle {
    /// Hand a row to the batcher. Waits while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Shutdown`] once the batcher has stopped.
    pub async fn send(&self, row: EventRow) -> Result<()> {
        self.tx
            .send(Command::Row(row))
            .await
            .map_err(|_| IngestError::Shutdown)
    }

    /// Flush now and return the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns the writer's error if the flush failed after retries, or
    /// [`IngestError::Shutdown`].
    pub async fn flush(&self) -> Result<usize> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .await
            .map_err(|_| IngestError::Shutdown)?;
        done.await.map_err(|_| IngestError::Shutdown)?
    }
}

/// Owner of the batching task.
pub struct Batcher {
    handle: BatcherHandle,
    worker: Worker,
}

struct Settings {
    batch_size: usize,
    flush_interval: Duration,
    max_buffered: usize,
    retry: RetryPolicy,
}

impl Batcher {
    /// Start the batching task.
    #[must_use]
    pub fn spawn<W: ColumnarWriter + 'static>(writer: Arc<W>, config: &IngestConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let settings = Settings {
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval,
            max_buffered: config.max_buffered.max(config.batch_size),
            retry: config.flush_retry.clone(),
        };

        let worker = Worker::spawn("ingest-batcher", move |cancel| async move {
            let mut state = BatchState {
                writer,
                settings,
                buffer: Vec::new(),
            };
            let mut rx = rx;
            let mut ticker = tokio::time::interval(state.settings.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(Command::Row(row)) => {
                            state.buffer.push(row);
                            if state.buffer.len() >= state.settings.batch_size {
                                let _ = state.flush("size").await;
                                ticker.reset();
                            }
                        }
                        Some(Command::Flush(reply)) => {
                            let _ = reply.send(state.flush("manual").await);
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if !state.buffer.is_empty() {
                            let _ = state.flush("interval").await;
                        }
                    }
                }
            }

            // Drain whatever producers managed to queue, then flush once more.
            rx.close();
            while let Ok(command) = rx.try_recv() {
                match command {
                    Command::Row(row) => state.buffer.push(row),
                    Command::Flush(reply) => {
                        let _ = reply.send(state.flush("manual").await);
                    }
                }
            }
            if let Err(e) = state.flush("shutdown").await {
                tracing::error!(
                    error = %e,
                    lost = state.buffer.len(),
                    "Final flush failed, buffered rows lost"
                );
            }
        });

        Self {
            handle: BatcherHandle { tx },
            worker,
        }
    }

    /// A sending handle.
    #[must_use]
    pub fn handle(&self) -> BatcherHandle {
        self.handle.clone()
    }

    /// Stop accepting rows, flush what is buffered and wait for it.
    pub async fn shutdown(self) {
        drop(self.handle);
        self.worker.stop().await;
        tracing::info!("Batcher shut down");
    }
}

struct BatchState<W> {
    writer: Arc<W>,
    settings: Settings,
    buffer: Vec<EventRow>,
}

impl<W: ColumnarWriter> BatchState<W> {
    async fn flush(&mut self, trigger: &'static str) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let writer = &self.writer;
        let rows = self.buffer.as_slice();
        let outcome = retry_with_predicate(
            &self.settings.retry,
            || writer.insert(rows),
            |e: &IngestError| e.kind().is_transient(),
        )
        .await;
        match outcome {
            Ok(()) => {
                let count = self.buffer.len();
                self.buffer.clear();
                metrics::counter!("ingest.rows_inserted").increment(count as u64);
                tracing::debug!(rows = count, trigger, "Flushed batch");
                Ok(count)
            }
            Err(e) if !e.kind().is_transient() => {
                let count = self.buffer.len();
                self.buffer.clear();
                metrics::counter!("ingest.rows_rejected").increment(count as u64);
                tracing::error!(error = %e, rows = count, trigger, "Batch rejected, dropping it");
                Err(e)
            }
            Err(e) => {
                metrics::counter!("ingest.flush_failures").increment(1);
                tracing::error!(
                    error = %e,
                    buffered = self.buffer.len(),
                    trigger,
                    "Flush failed, keeping rows for the next attempt"
                );
                self.enforce_bound();
                Err(e)
            }
        }
    }

    fn enforce_bound(&mut self) {
        let excess = self.buffer.len().saturating_sub(self.settings.max_buffered);
        if excess > 0 {
            self.buffer.drain(..excess);
            tracing::error!(dropped = excess, "Buffer over capacity, dropped oldest rows");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::MemoryWriter;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use travio_core::event::Envelope;

    fn row(id: &str) -> EventRow {
        EventRow::from_envelope(&Envelope::new(
            id,
            "order.created",
            "a",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            json!({"organization_id": "org"}),
        ))
        .unwrap()
    }

    fn config() -> IngestConfig {
        IngestConfig::default()
            .with_batch_size(3)
            .with_flush_interval(Duration::from_secs(5))
            .with_max_buffered(4)
            .with_flush_retry(RetryPolicy::none())
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_size() {
        let writer = Arc::new(MemoryWriter::new());
        let batcher = Batcher::spawn(Arc::clone(&writer), &config());
        let handle = batcher.handle();

        for id in ["a", "b", "c"] {
            handle.send(row(id)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(writer.rows().len(), 3);
        batcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_interval() {
        let writer = Arc::new(MemoryWriter::new());
        let batcher = Batcher::spawn(Arc::clone(&writer), &config());
        batcher.handle().send(row("a")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(writer.rows().is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(writer.rows().len(), 1);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn manual_flush_reports_count() {
        let writer = Arc::new(MemoryWriter::new());
        let batcher = Batcher::spawn(Arc::clone(&writer), &config());
        let handle = batcher.handle();
        handle.send(row("a")).await.unwrap();
        handle.send(row("b")).await.unwrap();

        assert_eq!(handle.flush().await.unwrap(), 2);
        assert_eq!(handle.flush().await.unwrap(), 0);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn failed_rows_are_retried_on_the_next_trigger() {
        let writer = Arc::new(MemoryWriter::new());
        let batcher = Batcher::spawn(Arc::clone(&writer), &config());
        let handle = batcher.handle();
        writer.fail_next(1);

        handle.send(row("a")).await.unwrap();
        assert!(handle.flush().await.is_err());
        assert_eq!(handle.flush().await.unwrap(), 1);
        assert_eq!(writer.rows().len(), 1);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn retry_policy_absorbs_transient_failures() {
        let writer = Arc::new(MemoryWriter::new());
        let config = config().with_flush_retry(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        let batcher = Batcher::spawn(Arc::clone(&writer), &config);
        writer.fail_next(2);

        batcher.handle().send(row("a")).await.unwrap();
        assert_eq!(batcher.handle().flush().await.unwrap(), 1);
        assert_eq!(writer.insert_calls(), 3);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_batches_are_not_retried() {
        let writer = Arc::new(MemoryWriter::new());
        let config = config().with_flush_retry(
            RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        let batcher = Batcher::spawn(Arc::clone(&writer), &config);
        let handle = batcher.handle();
        writer.reject_next(1);

        handle.send(row("a")).await.unwrap();
        assert!(matches!(handle.flush().await, Err(IngestError::Rejected(_))));
        assert_eq!(writer.insert_calls(), 1);

        // The rejected batch is gone; later rows flush normally.
        assert_eq!(handle.flush().await.unwrap(), 0);
        handle.send(row("b")).await.unwrap();
        assert_eq!(handle.flush().await.unwrap(), 1);
        let ids: Vec<_> = writer.rows().into_iter().map(|r| r.event_id).collect();
        assert_eq!(ids, ["b"]);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn oldest_rows_are_dropped_past_the_bound() {
        let writer = Arc::new(MemoryWriter::new());
        let config = config().with_batch_size(2).with_max_buffered(2);
        let batcher = Batcher::spawn(Arc::clone(&writer), &config);
        let handle = batcher.handle();
        writer.fail_next(2);

        // [a, b] fails on size; [a, b, c] fails again and sheds `a`.
        for id in ["a", "b", "c"] {
            handle.send(row(id)).await.unwrap();
        }
        assert_eq!(handle.flush().await.unwrap(), 2);
        let ids: Vec<_> = writer.rows().into_iter().map(|r| r.event_id).collect();
        assert_eq!(ids, ["b", "c"]);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_rows() {
        let writer = Arc::new(MemoryWriter::new());
        let batcher = Batcher::spawn(Arc::clone(&writer), &config());
        batcher.handle().send(row("a")).await.unwrap();
        let handle = batcher.handle();

        batcher.shutdown().await;
        assert_eq!(writer.rows().len(), 1);
        assert!(matches!(handle.send(row("b")).await, Err(IngestError::Shutdown)));
    }
}
