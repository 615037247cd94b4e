//! InfluxDB 1.x adapter over the HTTP API.
//!
//! Writes use the line protocol (`POST /write`), queries use InfluxQL
//! (`GET /query`) with millisecond epochs. The database and its default
//! retention policy are created lazily on first use; the check is
//! cached so steady-state calls never re-issue schema statements.

use crate::config::StoreConfig;
use crate::error::PlcError;
use crate::plc::Reading;
use crate::store::{line, Category, SeriesPoint, TimeRange, TimeSeriesStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct InfluxStore {
    config: StoreConfig,
    http: reqwest::Client,
    schema_ready: OnceCell<()>,
}

impl InfluxStore {
    pub fn new(config: StoreConfig) -> Result<Self, PlcError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PlcError::config(format!("http client: {e}")))?;
        Ok(Self {
            config,
            http,
            schema_ready: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create the database (with its retention policy) if this instance
    /// has not confirmed it yet. Idempotent on the server side; cached
    /// on success so later cycles skip the round trip. A failure leaves
    /// the cell unset, so the next cycle retries.
    async fn ensure_schema(&self) -> Result<(), PlcError> {
        self.schema_ready
            .get_or_try_init(|| async {
                let statement = format!(
                    "CREATE DATABASE \"{}\" WITH DURATION {} REPLICATION 1 NAME \"one_month\"",
                    self.config.database, self.config.retention
                );
                self.raw_query(&statement, false).await?;
                info!(database = %self.config.database, "time-series database ready");
                Ok(())
            })
            .await
            .copied()
    }

    /// Execute an InfluxQL statement and return the parsed body.
    async fn raw_query(&self, statement: &str, with_db: bool) -> Result<serde_json::Value, PlcError> {
        let mut params = vec![("q", statement.to_string()), ("epoch", "ms".to_string())];
        if with_db {
            params.push(("db", self.config.database.clone()));
        }
        let url = format!("{}/query", self.config.url);
        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PlcError::query(format!("{url}: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlcError::query(format!("invalid response body: {e}")))?;

        if !status.is_success() {
            return Err(PlcError::query(format!("status {status}: {body}")));
        }
        if let Some(err) = body["results"][0]["error"].as_str() {
            return Err(PlcError::query(err.to_string()));
        }
        Ok(body)
    }

    async fn select(&self, statement: &str) -> Result<Vec<SeriesPoint>, PlcError> {
        self.ensure_schema().await?;
        let body = self.raw_query(statement, true).await?;
        parse_series(&body)
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write(&self, reading: &Reading) -> Result<(), PlcError> {
        self.ensure_schema()
            .await
            .map_err(|e| PlcError::write(e.to_string()))?;

        let point = line::encode_point(&self.config.measurement, &self.config.source_tag, reading);
        debug!(point = %point, "writing reading");

        let url = format!("{}/write", self.config.url);
        let response = self
            .http
            .post(&url)
            .query(&[
                ("db", self.config.database.as_str()),
                ("precision", "ms"),
            ])
            .body(point)
            .send()
            .await
            .map_err(|e| PlcError::write(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlcError::write(format!("status {status}: {body}")));
        }
        Ok(())
    }

    async fn query_range(
        &self,
        category: Category,
        range: TimeRange,
    ) -> Result<Vec<SeriesPoint>, PlcError> {
        let statement = build_select(&self.config.measurement, category.fields(), &range.filter());
        self.select(&statement).await
    }

    async fn latest(&self) -> Result<Option<SeriesPoint>, PlcError> {
        let statement = format!(
            "SELECT * FROM \"{}\" ORDER BY time DESC LIMIT 1",
            self.config.measurement
        );
        Ok(self.select(&statement).await?.into_iter().next())
    }
}

/// Build the InfluxQL SELECT for a field group and time filter.
fn build_select(measurement: &str, fields: &[&str], filter: &str) -> String {
    let field_list = fields
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {field_list} FROM \"{measurement}\" WHERE {filter}")
}

/// Convert an InfluxDB query response into records.
///
/// The first column is always `time` (epoch ms thanks to `epoch=ms`);
/// remaining columns become fields, with JSON `null` preserved as
/// `None`. An absent series means no data in the window.
fn parse_series(body: &serde_json::Value) -> Result<Vec<SeriesPoint>, PlcError> {
    let series = &body["results"][0]["series"][0];
    if series.is_null() {
        return Ok(Vec::new());
    }

    let columns: Vec<&str> = series["columns"]
        .as_array()
        .ok_or_else(|| PlcError::query("series without columns"))?
        .iter()
        .filter_map(|c| c.as_str())
        .collect();
    if columns.first() != Some(&"time") {
        return Err(PlcError::query("first column is not time"));
    }

    let values = series["values"]
        .as_array()
        .ok_or_else(|| PlcError::query("series without values"))?;

    let mut points = Vec::with_capacity(values.len());
    for row in values {
        let row = row
            .as_array()
            .ok_or_else(|| PlcError::query("malformed value row"))?;
        let millis = row
            .first()
            .and_then(|t| t.as_i64())
            .ok_or_else(|| PlcError::query("non-numeric timestamp"))?;
        let time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| PlcError::query(format!("timestamp {millis} out of range")))?;

        let mut fields = BTreeMap::new();
        for (name, value) in columns.iter().skip(1).zip(row.iter().skip(1)) {
            fields.insert(name.to_string(), value.as_f64());
        }
        points.push(SeriesPoint { time, fields });
    }
    Ok(points)
}
