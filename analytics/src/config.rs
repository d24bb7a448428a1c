//! Ingest and ClickHouse configuration.

use crate::error::{IngestError, Result};
use std::time::Duration;
use travio_runtime::RetryPolicy;

/// Consumer, batcher and dedup settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Topics consumed by every consumer.
    pub topics: Vec<String>,
    /// Subscriptions in the consumer group.
    pub consumers: usize,
    /// Flush once this many rows are buffered.
    pub batch_size: usize,
    /// Flush at least this often while rows are buffered.
    pub flush_interval: Duration,
    /// Rows kept across failed flushes before the oldest are dropped.
    pub max_buffered: usize,
    /// Capacity of the channel between consumers and the batcher.
    pub channel_capacity: usize,
    /// How often the dedup set is cleared.
    pub dedup_reset_interval: Duration,
    /// Dedup set size that forces an early clear.
    pub dedup_capacity: usize,
    /// Retries of a failed flush.
    pub flush_retry: RetryPolicy,
}

impl IngestConfig {
    /// Default settings for `topics`.
    #[must_use]
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            topics,
            consumers: 1,
            batch_size: 10_000,
            flush_interval: Duration::from_secs(5),
            max_buffered: 100_000,
            channel_capacity: 10_000,
            dedup_reset_interval: Duration::from_secs(3600),
            dedup_capacity: 1_000_000,
            flush_retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(200))
                .max_delay(Duration::from_secs(5))
                .jitter(true)
                .build(),
        }
    }

    /// Set the number of consumers.
    #[must_use]
    pub const fn with_consumers(mut self, consumers: usize) -> Self {
        self.consumers = consumers;
        self
    }

    /// Set the size trigger.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the time trigger.
    #[must_use]
    pub const fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the buffer bound.
    #[must_use]
    pub const fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Set the dedup reset interval.
    #[must_use]
    pub const fn with_dedup_reset_interval(mut self, interval: Duration) -> Self {
        self.dedup_reset_interval = interval;
        self
    }

    /// Set the dedup capacity.
    #[must_use]
    pub const fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Set the flush retry policy.
    #[must_use]
    pub fn with_flush_retry(mut self, policy: RetryPolicy) -> Self {
        self.flush_retry = policy;
        self
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(IngestError::InvalidConfig(reason.to_string()));
        if self.topics.is_empty() {
            return invalid("at least one topic is required");
        }
        if self.consumers == 0 {
            return invalid("consumers must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.flush_interval.is_zero() {
            return invalid("flush_interval must be positive");
        }
        if self.max_buffered < self.batch_size {
            return invalid("max_buffered must be at least batch_size");
        }
        if self.channel_capacity == 0 || self.dedup_capacity == 0 {
            return invalid("capacities must be positive");
        }
        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::new(vec!["travio.events".to_string()])
    }
}

/// Connection to the ClickHouse HTTP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// Base URL, e.g. `http://localhost:8123`.
    pub url: String,
    /// Database holding the events table.
    pub database: String,
    /// User, if not `default`.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClickHouseConfig {
    /// Settings for `url` with the default database.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: "travio_analytics".to_string(),
            user: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = Some(user.into());
        self.password = password;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self::new("http://localhost:8123")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.flush_retry.max_retries, 2);
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(IngestConfig::new(Vec::new()).validate().is_err());
        assert!(IngestConfig::default().with_batch_size(0).validate().is_err());
        assert!(
            IngestConfig::default()
                .with_batch_size(10)
                .with_max_buffered(5)
                .validate()
                .is_err()
        );
    }
}
