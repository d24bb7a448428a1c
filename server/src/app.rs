//! Application lifecycle.
//!
//! 1. **Startup**: connect Postgres (retried with backoff), Redis, Kafka and
//!    `ClickHouse`, run migrations, load pricing rules, start background workers
//! 2. **Runtime**: serve the gateway
//! 3. **Shutdown**: on SIGINT/SIGTERM stop accepting connections, then stop
//!    admission workers, the scheduler and the ingest pipeline (with a final
//!    flush), and the periodic reload and cleanup tasks

use crate::config::Config;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use travio_analytics::stores::ClickHouseWriter;
use travio_analytics::{IngestPipeline, Scheduler, default_jobs, schema};
use travio_core::environment::SystemClock;
use travio_core::event_bus::EventBus;
use travio_gateway::{AppState, router};
use travio_identity::AuthService;
use travio_identity::stores::RedisTokenBlacklist;
use travio_identity::stores::postgres::{PostgresRefreshTokenRepository, PostgresUserRepository};
use travio_pricing::stores::PostgresRuleRepository;
use travio_pricing::{PricingConfig, PricingService};
use travio_queue::AdmissionController;
use travio_queue::stores::RedisQueueStore;
use travio_ratelimit::RateLimiter;
use travio_ratelimit::stores::RedisRateLimitStore;
use travio_redpanda::RedpandaEventBus;
use travio_runtime::{RetryPolicy, retry_with_backoff};

/// Connect every backend and serve until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if a backend cannot be reached at startup, a migration
/// fails, or the listener cannot bind.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let startup_retry = RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(10))
        .jitter(true)
        .build();

    let pool = retry_with_backoff(&startup_retry, || {
        PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
    })
    .await
    .context("Failed to connect to Postgres")?;
    info!("Connected to Postgres");

    let users = PostgresUserRepository::new(pool.clone());
    users.migrate().await.context("Identity migrations failed")?;
    let rules = PostgresRuleRepository::new(pool.clone());
    rules.migrate().await.context("Pricing migrations failed")?;

    let identity = Arc::new(AuthService::new(
        config.identity.clone(),
        users,
        PostgresRefreshTokenRepository::new(pool),
        RedisTokenBlacklist::new(&config.redis_url).await?,
        SystemClock,
    )?);
    let cleanup = identity.spawn_cleanup();

    let admission = Arc::new(AdmissionController::new(
        RedisQueueStore::new(&config.redis_url).await?,
        SystemClock,
        config.queue,
    ));

    let limiter = Arc::new(RateLimiter::new(
        RedisRateLimitStore::new(&config.redis_url).await?,
        SystemClock,
    ));

    let pricing = Arc::new(PricingService::new(rules, SystemClock, PricingConfig::default()));
    pricing.load().await.context("Failed to load pricing rules")?;
    let reload = pricing.spawn_reload();

    let writer = Arc::new(ClickHouseWriter::new(config.clickhouse.clone())?);
    schema::init_schema(writer.as_ref())
        .await
        .context("Failed to initialise ClickHouse schema")?;

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.kafka.brokers.clone())
            .consumer_group(config.kafka.consumer_group.clone())
            .build()?,
    );
    let ingest = IngestPipeline::start(bus, Arc::clone(&writer), config.ingest.clone()).await?;
    let scheduler = Scheduler::start(writer, SystemClock, default_jobs()?);

    let state = AppState::new(
        identity,
        Arc::clone(&admission) as _,
        limiter,
        pricing,
        config.gateway.clone(),
    );
    let app = router(state);

    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped, initiating graceful shutdown...");
    admission.shutdown().await;
    scheduler.stop().await;
    ingest.shutdown().await;
    reload.stop().await;
    cleanup.stop().await;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
