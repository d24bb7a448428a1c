//! ClickHouse writer over the HTTP interface.
//!
//! Inserts are sent as `INSERT INTO events FORMAT JSONEachRow` with one JSON
//! object per line; statements are sent as the request body.
//!
//! # Example
//!
//! ```no_run
//! use travio_analytics::{ClickHouseConfig, stores::ClickHouseWriter};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let writer = ClickHouseWriter::new(ClickHouseConfig::new("http://localhost:8123"))?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClickHouseConfig;
use crate::error::{IngestError, Result};
use crate::providers::ColumnarWriter;
use crate::row::EventRow;
use reqwest::{Client, StatusCode};

const INSERT_EVENTS: &str = "INSERT INTO events FORMAT JSONEachRow";

/// `ClickHouse` HTTP writer. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ClickHouseWriter {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseWriter {
    /// Build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Writer`] if the client cannot be built.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Writer(format!("Failed to build HTTP client: {e}")))?;

        tracing::info!(url = %config.url, database = %config.database, "ClickHouseWriter initialized");
        Ok(Self { client, config })
    }

    /// Encode rows as `JSONEachRow`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Rejected`] if a row fails to serialize.
    pub fn encode(rows: &[EventRow]) -> Result<String> {
        let mut body = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| IngestError::Rejected(format!("Failed to encode row: {e}")))?;
            body.push_str(&line);
            body.push('\n');
        }
        Ok(body)
    }

    async fn post(&self, query: Option<&str>, body: String) -> Result<()> {
        let mut params = vec![("database", self.config.database.as_str())];
        if let Some(query) = query {
            params.push(("query", query));
        }

        let mut request = self.client.post(&self.config.url).query(&params).body(body);
        if let Some(user) = &self.config.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.config.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::Writer(format!("ClickHouse request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let message = format!("ClickHouse returned {status}: {}", detail.trim());
        if is_permanent(status) {
            Err(IngestError::Rejected(message))
        } else {
            Err(IngestError::Writer(message))
        }
    }
}

/// Client errors other than timeouts and throttling mean the request itself
/// is wrong.
fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

impl ColumnarWriter for ClickHouseWriter {
    async fn insert(&self, rows: &[EventRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let body = Self::encode(rows)?;
        self.post(Some(INSERT_EVENTS), body).await?;
        tracing::debug!(rows = rows.len(), "Inserted rows into ClickHouse");
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.post(None, sql.to_string()).await
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Writer(format!("ClickHouse ping failed: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(IngestError::Writer(format!(
                "ClickHouse ping returned {}",
                response.status()
            )))
        }
    }
}
