//! Travio backbone server.
//!
//! Loads [`Config`] from the environment, connects the production backends
//! and serves the gateway until SIGINT or SIGTERM:
//!
//! ```text
//! Postgres ──► users, refresh tokens, pricing rules
//! Redis    ──► token blacklist, waiting rooms, rate-limit windows
//! Kafka    ──► ingest pipeline ──► ClickHouse ◄── rollup scheduler
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::run;
pub use config::{Config, KafkaSettings};
