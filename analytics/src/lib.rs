//! # Travio Analytics
//!
//! The analytics write path: bus → rows → batches → ClickHouse.
//!
//! - [`IngestPipeline`] subscribes to the event topics, decodes each
//!   envelope into an [`EventRow`], drops duplicates and poison messages,
//!   and acknowledges once the row is with the [`Batcher`].
//! - [`Batcher`] flushes on size, on time, on demand and at shutdown.
//! - [`ColumnarWriter`] is the store seam; [`stores::ClickHouseWriter`]
//!   talks to ClickHouse over HTTP.
//! - [`schema::init_schema`] creates the event table and rollups, and
//!   [`Scheduler`] runs the nightly and weekly jobs against them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use travio_analytics::*;
//!
//! let writer = Arc::new(stores::ClickHouseWriter::new(ClickHouseConfig::default())?);
//! schema::init_schema(writer.as_ref()).await?;
//!
//! let pipeline = IngestPipeline::start(bus, Arc::clone(&writer), IngestConfig::default()).await?;
//! let scheduler = Scheduler::start(writer, SystemClock, default_jobs()?);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod batcher;
pub mod config;
pub mod cron;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod row;
pub mod scheduler;
pub mod schema;
pub mod stores;

// In-memory writer (for testing)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use batcher::{Batcher, BatcherHandle};
pub use config::{ClickHouseConfig, IngestConfig};
pub use cron::CronSchedule;
pub use dedup::Deduplicator;
pub use error::{IngestError, Result};
pub use pipeline::IngestPipeline;
pub use providers::ColumnarWriter;
pub use row::EventRow;
pub use scheduler::{JOB_TIMEOUT, Job, Scheduler, default_jobs};
