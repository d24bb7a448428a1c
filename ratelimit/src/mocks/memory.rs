//! In-memory window store for testing.

use crate::error::{RateLimitError, Result};
use crate::providers::{Acquire, RateLimitStore, WindowState, score_micros, window_micros};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// (score µs, member, cost)
type Window = Vec<(i64, String, u64)>;

/// In-memory sliding-window store.
///
/// Windows are only trimmed when their key is touched; there is no ttl
/// sweep. Good enough for tests, not for long-running processes.
#[derive(Debug, Clone, Default)]
pub struct MockRateLimitStore {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockRateLimitStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`RateLimitError::Cache`], as if Redis
    /// were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of entries stored under `key`, expired or not.
    #[must_use]
    pub fn entry_count(&self, key: &str) -> usize {
        self.windows
            .lock()
            .map(|windows| windows.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Window>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RateLimitError::Cache("Connection refused".to_string()));
        }
        self.windows
            .lock()
            .map_err(|_| RateLimitError::Cache("Failed to acquire lock".to_string()))
    }

    fn trim(window: &mut Window, now: i64, length: i64) -> u64 {
        let cutoff = now.saturating_sub(length);
        window.retain(|(score, _, _)| *score >= cutoff);
        window.iter().map(|(_, _, cost)| cost).sum()
    }
}

impl RateLimitStore for MockRateLimitStore {
    async fn acquire(&self, request: &Acquire<'_>, now: DateTime<Utc>) -> Result<WindowState> {
        let mut windows = self.lock()?;
        let now = score_micros(now);
        let window = windows.entry(request.key.to_string()).or_default();
        let used = Self::trim(window, now, window_micros(request.window));

        let allowed = used + request.cost <= request.limit;
        if allowed {
            window.push((now, request.member.to_string(), request.cost));
        }
        Ok(WindowState { allowed, used })
    }

    async fn usage(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut windows = self.lock()?;
        Ok(windows
            .get_mut(key)
            .map_or(0, |entries| {
                Self::trim(entries, score_micros(now), window_micros(window))
            }))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
