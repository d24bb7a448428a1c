//! Tracing and Prometheus setup.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "travio=info,tower_http=info";

/// Install the global `fmt` subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Serve Prometheus metrics on `addr`.
///
/// # Errors
///
/// Returns an error if the exporter cannot bind or a recorder is already
/// installed.
pub fn install_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    describe_metrics();
    tracing::info!(%addr, "Prometheus metrics available at /metrics");
    Ok(())
}

fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!("rate_limit.checks", "Rate limit checks by outcome (allowed, denied)");
    describe_counter!("rate_limit.fail_open", "Requests allowed because the limiter was unavailable");
    describe_counter!("queue.joined", "Users who joined a waiting room");
    describe_counter!("queue.admitted", "Users admitted from a waiting room");
    describe_counter!("identity.logins", "Login attempts by outcome");
    describe_counter!("identity.refresh_reuse_detected", "Replayed refresh tokens; each revokes a family");
    describe_counter!("ingest.events_consumed", "Deliveries received from the bus");
    describe_counter!("ingest.consume_errors", "Bus errors while consuming");
    describe_counter!("ingest.rows_inserted", "Event rows written to ClickHouse");
    describe_counter!("ingest.duplicates_dropped", "Events dropped as duplicates");
    describe_counter!("ingest.poison_messages", "Events that could not be parsed");
    describe_counter!("ingest.flush_failures", "Batch flushes that failed after retries");
    describe_counter!("pricing.rules_compiled", "Pricing rules compiled on publish");
    describe_counter!("pricing.rules_rejected", "Pricing rules excluded for failing to compile");
    describe_counter!("scheduler.job_runs", "Scheduled job runs by job and outcome");
    describe_histogram!("scheduler.job_duration_seconds", "Duration of scheduled job runs");
}
