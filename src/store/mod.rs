//! Time-series store adapter: persisting readings and answering
//! bucketed range queries.

pub mod influx;
pub mod line;

pub use influx::InfluxStore;

use crate::error::PlcError;
use crate::plc::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Query category, selecting one group of channel fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Temperature,
    Humidity,
    Airflow,
}

impl Category {
    /// Fields belonging to this category, in schema order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Category::Temperature => &[
                "T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9", "T10",
            ],
            Category::Humidity => &["H1", "H2"],
            Category::Airflow => &["Air_Speed"],
        }
    }
}

impl FromStr for Category {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Category::Temperature),
            "humidity" => Ok(Category::Humidity),
            "airflow" => Ok(Category::Airflow),
            other => Err(PlcError::query(format!("unknown category '{other}'"))),
        }
    }
}

/// Time window for a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Last24h,
    Last7d,
    Last30d,
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    /// InfluxQL `WHERE` clause for this window.
    pub fn filter(&self) -> String {
        match self {
            TimeRange::Last24h => "time > now() - 24h".to_string(),
            TimeRange::Last7d => "time > now() - 7d".to_string(),
            TimeRange::Last30d => "time > now() - 30d".to_string(),
            TimeRange::Absolute { start, end } => format!(
                "time >= '{}' AND time <= '{}'",
                start.to_rfc3339(),
                end.to_rfc3339()
            ),
        }
    }
}

/// One record of a range-query result.
///
/// Fields the store has no data for stay `None` and serialize as JSON
/// `null`, so absence is distinguishable from a genuine zero reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Record timestamp
    pub time: DateTime<Utc>,
    /// Field name to value; `None` where the store holds no data
    #[serde(flatten)]
    pub fields: BTreeMap<String, Option<f64>>,
}

/// Seam between the collector/web layers and the concrete store.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Persist one reading. Ensures the target schema exists first.
    async fn write(&self, reading: &Reading) -> Result<(), PlcError>;

    /// Records for one category within `range`, ascending by timestamp.
    async fn query_range(
        &self,
        category: Category,
        range: TimeRange,
    ) -> Result<Vec<SeriesPoint>, PlcError>;

    /// The most recent record, if any data has been written.
    async fn latest(&self) -> Result<Option<SeriesPoint>, PlcError>;
}
