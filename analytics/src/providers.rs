//! Columnar store trait.

use crate::error::Result;
use crate::row::EventRow;
use std::future::Future;

/// Write side of the analytics store.
pub trait ColumnarWriter: Send + Sync {
    /// Bulk insert rows into `events`. All or nothing.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Writer` if the store rejects the batch.
    fn insert(&self, rows: &[EventRow]) -> impl Future<Output = Result<()>> + Send;

    /// Run a statement (DDL, rollup, maintenance).
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Writer` if the statement fails.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Writer` if it is not.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}
