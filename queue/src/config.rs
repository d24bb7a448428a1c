//! Queue configuration.
//!
//! [`QueueConfig`] is per event and persisted next to the queue so every
//! node admits with the same parameters. [`QueueSettings`] is per process.

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission parameters of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Event the configuration applies to.
    pub event_id: String,

    /// Upper bound on users purchasing at once (advisory).
    ///
    /// Default: 100
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: u32,

    /// Users admitted per tick.
    ///
    /// Default: 10
    #[serde(default = "defaults::batch_size")]
    pub batch_size: u32,

    /// Time between admission ticks, serialised in seconds.
    ///
    /// Default: 60 seconds
    #[serde(with = "duration_secs", default = "defaults::admission_interval")]
    pub admission_interval: Duration,

    /// Lifetime of an admission ticket, serialised in seconds.
    ///
    /// Default: 600 seconds
    #[serde(with = "duration_secs", default = "defaults::token_ttl")]
    pub token_ttl: Duration,

    /// Whether the waiting room is active. Disabled events admit everyone.
    ///
    /// Default: true
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

mod defaults {
    use std::time::Duration;

    pub const fn max_concurrent() -> u32 {
        100
    }
    pub const fn batch_size() -> u32 {
        10
    }
    pub const fn admission_interval() -> Duration {
        Duration::from_secs(60)
    }
    pub const fn token_ttl() -> Duration {
        Duration::from_secs(600)
    }
    pub const fn enabled() -> bool {
        true
    }
}

impl QueueConfig {
    /// Default configuration for `event_id`.
    #[must_use]
    pub fn for_event(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            max_concurrent: defaults::max_concurrent(),
            batch_size: defaults::batch_size(),
            admission_interval: defaults::admission_interval(),
            token_ttl: defaults::token_ttl(),
            enabled: defaults::enabled(),
        }
    }

    /// Set the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the admission interval.
    #[must_use]
    pub const fn with_admission_interval(mut self, interval: Duration) -> Self {
        self.admission_interval = interval;
        self
    }

    /// Set the ticket lifetime.
    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Enable or disable the waiting room.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] for an empty event id, a zero
    /// batch size, or an interval or ttl shorter than one second.
    pub fn validate(&self) -> Result<()> {
        if self.event_id.trim().is_empty() {
            return Err(QueueError::InvalidConfig("event_id must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(QueueError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.admission_interval < Duration::from_secs(1) {
            return Err(QueueError::InvalidConfig(
                "admission_interval must be at least one second".into(),
            ));
        }
        if self.token_ttl < Duration::from_secs(1) {
            return Err(QueueError::InvalidConfig(
                "token_ttl must be at least one second".into(),
            ));
        }
        Ok(())
    }

    /// Users admitted per minute at this configuration.
    #[must_use]
    pub fn admission_rate_per_min(&self) -> f64 {
        f64::from(self.batch_size) * 60.0 / self.admission_interval.as_secs_f64().max(1.0)
    }

    /// Estimated wait in seconds for a user at 1-based `position`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimated_wait_secs(&self, position: u64) -> u64 {
        let rate = self.admission_rate_per_min();
        if position == 0 || rate <= 0.0 {
            return 0;
        }
        (position as f64 * 60.0 / rate).ceil() as u64
    }
}

/// Process-wide queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum waiting users per event.
    ///
    /// Default: 1 000 000
    pub max_size: u64,

    /// Lifetime of a waiting entry blob.
    ///
    /// Default: 2 hours
    pub entry_ttl: Duration,
}

impl QueueSettings {
    /// Create settings.
    #[must_use]
    pub const fn new(max_size: u64, entry_ttl: Duration) -> Self {
        Self { max_size, entry_ttl }
    }

    /// Set the per-event capacity.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::new(1_000_000, Duration::from_secs(2 * 60 * 60))
    }
}

/// `serde` adapter storing a [`Duration`] as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialize from seconds.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = QueueConfig::for_event("evt");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.admission_interval, Duration::from_secs(60));
        assert_eq!(config.token_ttl, Duration::from_secs(600));
        assert!(config.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"event_id":"evt","batch_size":2,"admission_interval":1}"#).unwrap();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.admission_interval, Duration::from_secs(1));
        assert_eq!(config.token_ttl, Duration::from_secs(600));
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(QueueConfig::for_event("").validate().is_err());
        assert!(QueueConfig::for_event("evt").with_batch_size(0).validate().is_err());
        assert!(
            QueueConfig::for_event("evt")
                .with_admission_interval(Duration::from_millis(10))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn wait_estimate() {
        // 10 per minute: six seconds per position.
        let config = QueueConfig::for_event("evt");
        assert!((config.admission_rate_per_min() - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.estimated_wait_secs(1), 6);
        assert_eq!(config.estimated_wait_secs(25), 150);

        let fast = config.with_batch_size(2).with_admission_interval(Duration::from_secs(1));
        assert_eq!(fast.estimated_wait_secs(3), 2);
    }
}
