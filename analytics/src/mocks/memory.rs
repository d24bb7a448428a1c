//! In-memory columnar writer.

use crate::error::{IngestError, Result};
use crate::providers::ColumnarWriter;
use crate::row::EventRow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    rows: Vec<EventRow>,
    statements: Vec<String>,
    insert_calls: usize,
    failures_left: usize,
    rejections_left: usize,
}

/// Writer that keeps rows in memory.
///
/// [`rows`](Self::rows) returns every inserted row, duplicates included;
/// [`final_rows`](Self::final_rows) collapses them by `event_id`, as
/// `SELECT … FINAL` does on a `ReplacingMergeTree`.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    state: Arc<Mutex<State>>,
}

impl MemoryWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` inserts and statements.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_left = count;
    }

    /// Reject the next `count` inserts and statements as malformed.
    pub fn reject_next(&self, count: usize) {
        self.lock().rejections_left = count;
    }

    /// Every row inserted so far.
    #[must_use]
    pub fn rows(&self) -> Vec<EventRow> {
        self.lock().rows.clone()
    }

    /// Rows after collapsing duplicates by `event_id`, first wins.
    #[must_use]
    pub fn final_rows(&self) -> Vec<EventRow> {
        let mut seen = HashSet::new();
        self.lock()
            .rows
            .iter()
            .filter(|row| seen.insert(row.event_id.clone()))
            .cloned()
            .collect()
    }

    /// Statements executed so far.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Number of insert attempts, failed ones included.
    #[must_use]
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    fn take_failure(state: &mut State) -> Result<()> {
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(IngestError::Rejected("injected rejection".to_string()));
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(IngestError::Writer("injected failure".to_string()));
        }
        Ok(())
    }
}

impl ColumnarWriter for MemoryWriter {
    async fn insert(&self, rows: &[EventRow]) -> Result<()> {
        let mut state = self.lock();
        state.insert_calls += 1;
        Self::take_failure(&mut state)?;
        state.rows.extend_from_slice(rows);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.lock();
        Self::take_failure(&mut state)?;
        state.statements.push(sql.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
