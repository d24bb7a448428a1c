//! Travio backbone server.
//!
//! ```bash
//! docker compose up -d
//! JWT_ACCESS_SECRET=... JWT_REFRESH_SECRET=... cargo run -p travio-server
//! ```

use travio_server::{Config, run, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let config = Config::from_env()?;
    telemetry::install_metrics(config.metrics_addr())?;

    run(config).await
}
