//! Production columnar writers.

pub mod clickhouse;

pub use clickhouse::ClickHouseWriter;
