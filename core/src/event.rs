//! Event envelope carried on the message bus.
//!
//! Producers across the platform wrap every domain event in the same JSON
//! envelope. The payload is opaque at this layer; consumers decode it based
//! on `type`.
//!
//! ```json
//! {
//!   "id": "5b0f...",
//!   "type": "order.created",
//!   "aggregate_id": "ord_123",
//!   "timestamp": "2026-03-14T09:30:00Z",
//!   "version": 1,
//!   "payload": { "organization_id": "org_1", "total_paisa": 150000 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for envelope encoding.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Failed to serialize an envelope to bytes.
    #[error("Failed to serialize envelope: {0}")]
    Serialization(String),

    /// Failed to parse bytes into an envelope.
    #[error("Failed to parse envelope: {0}")]
    Malformed(String),
}

/// Transport wrapper around a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally unique event id; the idempotency key downstream.
    pub id: String,

    /// Dotted event type, e.g. `order.created`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Id of the aggregate that emitted the event.
    #[serde(default)]
    pub aggregate_id: String,

    /// When the event happened.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the payload.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Opaque payload, decoded by consumers according to `event_type`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

const fn default_version() -> u32 {
    1
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            timestamp,
            version: default_version(),
            payload,
        }
    }

    /// Set the payload schema version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Encode to JSON bytes for the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if the payload cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }

    /// Decode from JSON bytes received from the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if the bytes are not a valid envelope
    /// or the id is empty.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        if envelope.id.trim().is_empty() {
            return Err(EnvelopeError::Malformed("empty envelope id".to_string()));
        }
        Ok(envelope)
    }

    /// Domain of the event type (`order` for `order.created`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.event_type
            .split_once('.')
            .map_or(self.event_type.as_str(), |(domain, _)| domain)
    }

    /// Action part of the event type (`created` for `order.created`).
    #[must_use]
    pub fn action(&self) -> &str {
        self.event_type
            .rsplit_once('.')
            .map_or("", |(_, action)| action)
    }
}
