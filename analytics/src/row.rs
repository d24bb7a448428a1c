//! Normalised event rows and their decoding from bus envelopes.
//!
//! | event type                              | status        |
//! |-----------------------------------------|---------------|
//! | `order.created`                         | `created`     |
//! | `order.confirmed`, `order.completed`    | `completed`   |
//! | `order.cancelled`                       | `cancelled`   |
//! | `payment.<action>`                      | `<action>`    |
//! | anything else                           | payload `status`, else `<action>` |

use crate::error::{IngestError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use travio_core::event::Envelope;

/// One row of the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRow {
    /// Envelope id; the idempotency key.
    pub event_id: String,
    /// Dotted event type.
    pub event_type: String,
    /// Owning organization.
    pub org_id: String,
    /// Acting user, empty when unknown.
    pub user_id: String,
    /// When the event happened.
    #[serde(serialize_with = "serialize_datetime64")]
    pub timestamp: DateTime<Utc>,
    /// Order, for order and payment events.
    pub order_id: Option<String>,
    /// Payment, for payment events.
    pub payment_id: Option<String>,
    /// Trip.
    pub trip_id: Option<String>,
    /// Route.
    pub route_id: Option<String>,
    /// Amount in minor units (paisa).
    pub amount: i64,
    /// Normalised status.
    pub status: String,
    /// Raw payload JSON.
    pub metadata: String,
}

impl EventRow {
    /// Decode a bus message.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Parse`] if the bytes are not an envelope, the
    /// payload is not an object, or it lacks `organization_id`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope =
            Envelope::from_slice(bytes).map_err(|e| IngestError::Parse(e.to_string()))?;
        Self::from_envelope(&envelope)
    }

    /// Normalise an envelope into a row.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Parse`] on a non-object payload or a missing
    /// `organization_id`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let payload = envelope.payload.as_object().ok_or_else(|| {
            IngestError::Parse(format!("event {}: payload is not an object", envelope.id))
        })?;
        let org_id = text(payload, "organization_id").ok_or_else(|| {
            IngestError::Parse(format!("event {}: missing organization_id", envelope.id))
        })?;

        Ok(Self {
            event_id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            org_id,
            user_id: text(payload, "user_id").unwrap_or_default(),
            timestamp: envelope.timestamp,
            order_id: text(payload, "order_id"),
            payment_id: text(payload, "payment_id"),
            trip_id: text(payload, "trip_id"),
            route_id: text(payload, "route_id"),
            amount: amount(payload),
            status: status(envelope, payload),
            metadata: envelope.payload.to_string(),
        })
    }

    /// Partition date.
    #[must_use]
    pub fn event_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

fn text(payload: &Map<String, Value>, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn amount(payload: &Map<String, Value>) -> i64 {
    ["total_paisa", "amount_paisa"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_i64))
        .unwrap_or(0)
}

fn status(envelope: &Envelope, payload: &Map<String, Value>) -> String {
    match (envelope.domain(), envelope.action()) {
        ("order", "created") => "created".to_string(),
        ("order", "confirmed" | "completed") => "completed".to_string(),
        ("order", "cancelled") => "cancelled".to_string(),
        ("order" | "payment", action) => action.to_string(),
        (_, action) => text(payload, "status").unwrap_or_else(|| action.to_string()),
    }
}

/// `DateTime64(3)` text form accepted by `JSONEachRow`.
fn serialize_datetime64<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format("%Y-%m-%d %H:%M:%S%.3f"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn envelope(event_type: &str, payload: Value) -> Envelope {
        Envelope::new(
            "evt-1",
            event_type,
            "agg-1",
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            payload,
        )
    }

    #[test]
    fn order_created() {
        let row = EventRow::from_envelope(&envelope(
            "order.created",
            json!({
                "organization_id": "org-1",
                "user_id": "u-1",
                "order_id": "ord-1",
                "trip_id": "trip-1",
                "route_id": "route-1",
                "total_paisa": 150_000
            }),
        ))
        .unwrap();

        assert_eq!(row.org_id, "org-1");
        assert_eq!(row.user_id, "u-1");
        assert_eq!(row.order_id.as_deref(), Some("ord-1"));
        assert_eq!(row.route_id.as_deref(), Some("route-1"));
        assert_eq!(row.amount, 150_000);
        assert_eq!(row.status, "created");
        assert_eq!(row.event_date(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }

    #[test]
    fn statuses_follow_the_type() {
        let payload = json!({"organization_id": "org-1", "status": "scheduled"});
        let status_of = |t: &str| EventRow::from_envelope(&envelope(t, payload.clone())).unwrap().status;

        assert_eq!(status_of("order.confirmed"), "completed");
        assert_eq!(status_of("order.completed"), "completed");
        assert_eq!(status_of("order.cancelled"), "cancelled");
        assert_eq!(status_of("payment.captured"), "captured");
        assert_eq!(status_of("trip.created"), "scheduled");
        let bare = json!({"organization_id": "org-1"});
        assert_eq!(
            EventRow::from_envelope(&envelope("booking.expired", bare)).unwrap().status,
            "expired"
        );
    }

    #[test]
    fn payment_amount_falls_back_to_amount_paisa() {
        let row = EventRow::from_envelope(&envelope(
            "payment.captured",
            json!({"organization_id": "org-1", "payment_id": "pay-1", "amount_paisa": 990}),
        ))
        .unwrap();
        assert_eq!(row.amount, 990);
        assert_eq!(row.payment_id.as_deref(), Some("pay-1"));
    }

    #[test]
    fn poison_messages() {
        assert!(matches!(EventRow::decode(b"{oops"), Err(IngestError::Parse(_))));
        assert!(EventRow::from_envelope(&envelope("order.created", json!([1, 2]))).is_err());
        assert!(EventRow::from_envelope(&envelope("order.created", json!({"user_id": "u"}))).is_err());
    }

    #[test]
    fn serializes_for_json_each_row() {
        let row = EventRow::from_envelope(&envelope(
            "order.created",
            json!({"organization_id": "org-1"}),
        ))
        .unwrap();
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["timestamp"], "2026-03-14 09:30:00.000");
        assert_eq!(value["order_id"], Value::Null);
        assert_eq!(value["metadata"], r#"{"organization_id":"org-1"}"#);
    }
}
