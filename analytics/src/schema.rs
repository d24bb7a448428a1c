//! ClickHouse schema for the analytics store.
//!
//! `events` is a `ReplacingMergeTree` whose sorting key ends with
//! `event_id`, so a redelivered event collapses into one row on merge.
//! The summing views roll up on insert; `daily_revenue` is recomputed from
//! `events FINAL` by the nightly job and is the duplicate-free figure.

use crate::error::Result;
use crate::providers::ColumnarWriter;

/// Raw events.
pub const CREATE_EVENTS: &str = r"
CREATE TABLE IF NOT EXISTS events (
    event_id    String,
    event_type  LowCardinality(String),
    org_id      String,
    user_id     String,
    timestamp   DateTime64(3, 'UTC'),
    order_id    Nullable(String),
    payment_id  Nullable(String),
    trip_id     Nullable(String),
    route_id    Nullable(String),
    amount      Int64,
    status      LowCardinality(String),
    metadata    String,
    event_date  Date MATERIALIZED toDate(timestamp)
) ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(event_date)
ORDER BY (org_id, event_type, timestamp, event_id)
TTL event_date + INTERVAL 2 YEAR";

/// Revenue per organization and day, summed on insert.
pub const CREATE_DAILY_REVENUE_MV: &str = r"
CREATE MATERIALIZED VIEW IF NOT EXISTS daily_revenue_mv
ENGINE = SummingMergeTree
PARTITION BY toYYYYMM(date)
ORDER BY (org_id, date)
AS SELECT
    org_id,
    toDate(timestamp) AS date,
    count() AS order_count,
    sum(amount) AS revenue
FROM events
WHERE event_type IN ('order.confirmed', 'order.completed')
GROUP BY org_id, date";

/// Booking activity per organization and hour.
pub const CREATE_HOURLY_BOOKINGS_MV: &str = r"
CREATE MATERIALIZED VIEW IF NOT EXISTS hourly_bookings_mv
ENGINE = SummingMergeTree
ORDER BY (org_id, hour)
AS SELECT
    org_id,
    toStartOfHour(timestamp) AS hour,
    count() AS booking_count,
    countIf(status = 'completed') AS completed_count,
    countIf(status = 'cancelled') AS cancelled_count
FROM events
WHERE startsWith(event_type, 'order.')
GROUP BY org_id, hour";

/// Bookings and revenue per trip.
pub const CREATE_TRIP_PERFORMANCE_MV: &str = r"
CREATE MATERIALIZED VIEW IF NOT EXISTS trip_performance_mv
ENGINE = SummingMergeTree
ORDER BY (org_id, trip_id)
AS SELECT
    org_id,
    assumeNotNull(trip_id) AS trip_id,
    count() AS booking_count,
    sum(amount) AS revenue
FROM events
WHERE event_type IN ('order.confirmed', 'order.completed') AND trip_id IS NOT NULL
GROUP BY org_id, trip_id";

/// Exact daily revenue, rewritten by the nightly rollup.
pub const CREATE_DAILY_REVENUE: &str = r"
CREATE TABLE IF NOT EXISTS daily_revenue (
    org_id       String,
    date         Date,
    order_count  UInt64,
    revenue      Int64
) ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(date)
ORDER BY (org_id, date)";

/// Every statement, in creation order.
pub const STATEMENTS: [&str; 5] = [
    CREATE_EVENTS,
    CREATE_DAILY_REVENUE_MV,
    CREATE_HOURLY_BOOKINGS_MV,
    CREATE_TRIP_PERFORMANCE_MV,
    CREATE_DAILY_REVENUE,
];

/// Create tables and views that do not exist yet.
///
/// # Errors
///
/// Returns the first statement's error; earlier statements stay applied.
pub async fn init_schema<W: ColumnarWriter>(writer: &W) -> Result<()> {
    for statement in STATEMENTS {
        writer.execute(statement).await?;
    }
    tracing::info!(statements = STATEMENTS.len(), "Analytics schema initialized");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::MemoryWriter;

    #[tokio::test]
    async fn applies_every_statement_in_order() {
        let writer = MemoryWriter::new();
        init_schema(&writer).await.unwrap();
        let statements = writer.statements();
        assert_eq!(statements.len(), 5);
        assert!(statements[0].contains("ReplacingMergeTree"));
        assert!(statements[0].contains("TTL event_date + INTERVAL 2 YEAR"));
    }

    #[tokio::test]
    async fn stops_at_the_first_failure() {
        let writer = MemoryWriter::new();
        writer.fail_next(1);
        assert!(init_schema(&writer).await.is_err());
        assert!(writer.statements().is_empty());
    }
}
