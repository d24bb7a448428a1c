//! Supervised background tasks.
//!
//! A [`Worker`] pairs a spawned task with the [`CancellationToken`] that
//! stops it. The owner of the handle is the only party allowed to stop the
//! task, and stopping awaits the task so no work outlives its owner.
//!
//! ```rust
//! use travio_runtime::worker::Worker;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let worker = Worker::spawn("heartbeat", |cancel| async move {
//!     let mut ticker = tokio::time::interval(Duration::from_secs(1));
//!     loop {
//!         tokio::select! {
//!             () = cancel.cancelled() => break,
//!             _ = ticker.tick() => tracing::debug!("tick"),
//!         }
//!     }
//! });
//!
//! worker.stop().await;
//! # }
//! ```

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a cancellable background task.
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn a task that receives its cancellation token.
    pub fn spawn<F, Fut>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(name, CancellationToken::new(), task)
    }

    /// Spawn a task bound to an existing (usually child) token.
    pub fn spawn_with_token<F, Fut>(name: impl Into<String>, cancel: CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(worker = %name, "Starting worker");
        let handle = tokio::spawn(task(cancel.clone()));
        Self {
            name,
            cancel,
            handle,
        }
    }

    /// Worker name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(()) => tracing::debug!(worker = %self.name, "Worker stopped"),
            Err(e) if e.is_panic() => {
                tracing::error!(worker = %self.name, error = %e, "Worker panicked");
            }
            Err(e) => tracing::warn!(worker = %self.name, error = %e, "Worker aborted"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn stop_cancels_and_joins() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);

        let worker = Worker::spawn("test", |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(worker.name(), "test");
        worker.stop().await;
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn parent_token_cancels_children() {
        let parent = CancellationToken::new();
        let worker = Worker::spawn_with_token("child", parent.child_token(), |cancel| async move {
            cancel.cancelled().await;
        });

        parent.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !worker.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
