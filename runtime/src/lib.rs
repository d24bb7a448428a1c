//! # Travio Runtime
//!
//! Execution helpers shared by the long-running parts of the backbone:
//!
//! - [`retry`]: exponential backoff for transient failures
//! - [`worker`]: cancellable, supervised background tasks
//!
//! Admission workers, the ingest batcher, the rollup scheduler and the
//! refresh-token cleanup job are all built on these two modules.

pub mod retry;
pub mod worker;

pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
pub use worker::Worker;
pub use tokio_util::sync::CancellationToken;
