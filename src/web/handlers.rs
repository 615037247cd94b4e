//! HTTP handlers for the collector control surface and the history
//! query API.

use crate::error::PlcError;
use crate::service::CollectorService;
use crate::store::{Category, SeriesPoint, TimeRange, TimeSeriesStore};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CollectorService>,
    pub store: Arc<dyn TimeSeriesStore>,
}

/// Query parameters for the collector control endpoint.
#[derive(Debug, Deserialize)]
pub struct CollectorParams {
    pub action: Option<String>,
    pub interval: Option<u64>,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Payload for `/history`: one ascending-time series per category.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub range: String,
    pub temperatures: Vec<SeriesPoint>,
    pub humidity: Vec<SeriesPoint>,
    #[serde(rename = "airSpeed")]
    pub air_speed: Vec<SeriesPoint>,
}

/// Map a cycle or query error onto a status code.
fn error_status(err: &PlcError) -> StatusCode {
    match err {
        PlcError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        PlcError::Config(_) | PlcError::Address(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_body(err: &PlcError) -> Json<serde_json::Value> {
    Json(json!({ "success": false, "error": err.to_string() }))
}

/// `GET /collector?action=start|stop|status|read`.
pub async fn collector_handler(
    State(state): State<AppState>,
    Query(params): Query<CollectorParams>,
) -> Response {
    match params.action.as_deref() {
        Some("start") => {
            let interval = params.interval.unwrap_or(crate::DEFAULT_INTERVAL_SECS);
            Json(state.service.clone().start(interval)).into_response()
        }
        Some("stop") => Json(state.service.stop()).into_response(),
        Some("status") => Json(state.service.status()).into_response(),
        Some("read") => match state.service.read_now().await {
            Ok(outcome) => Json(json!({ "success": true, "data": outcome })).into_response(),
            Err(e) => {
                warn!(error = %e, "on-demand read failed");
                (error_status(&e), error_body(&e)).into_response()
            }
        },
        Some(other) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": format!("unknown action '{other}'"),
            })),
        )
            .into_response(),
        None => {
            let status = state.service.status();
            let latest = match state.store.latest().await {
                Ok(point) => point,
                Err(e) => {
                    warn!(error = %e, "latest reading lookup failed");
                    None
                }
            };
            Json(json!({
                "message": "PLC data collection service",
                "usage": "use ?action=start|stop|status|read to control the service",
                "status": status,
                "latest": latest,
            }))
            .into_response()
        }
    }
}

/// `GET /history?range={24h|7d|30d|custom}&start=&end=`.
pub async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let range_name = params.range.unwrap_or_else(|| "24h".to_string());
    let range = match parse_time_range(&range_name, params.start.as_deref(), params.end.as_deref())
    {
        Ok(range) => range,
        Err(e) => return (StatusCode::BAD_REQUEST, error_body(&e)).into_response(),
    };

    let (temperatures, humidity, air_speed) = tokio::join!(
        state.store.query_range(Category::Temperature, range),
        state.store.query_range(Category::Humidity, range),
        state.store.query_range(Category::Airflow, range),
    );

    match (temperatures, humidity, air_speed) {
        (Ok(temperatures), Ok(humidity), Ok(air_speed)) => Json(HistoryResponse {
            success: true,
            range: range_name,
            temperatures,
            humidity,
            air_speed,
        })
        .into_response(),
        (t, h, a) => {
            let e = [t.err(), h.err(), a.err()]
                .into_iter()
                .flatten()
                .next()
                .unwrap_or_else(|| PlcError::query("unknown store failure"));
            warn!(error = %e, "history query failed");
            (error_status(&e), error_body(&e)).into_response()
        }
    }
}

/// Liveness probe.
pub async fn healthz_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolve the range parameter into a query window. `custom` requires
/// both RFC3339 bounds.
fn parse_time_range(
    range: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<TimeRange, PlcError> {
    match range {
        "24h" => Ok(TimeRange::Last24h),
        "7d" => Ok(TimeRange::Last7d),
        "30d" => Ok(TimeRange::Last30d),
        "custom" => {
            let (start, end) = match (start, end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(PlcError::config(
                        "custom range requires both start and end parameters",
                    ))
                }
            };
            let start = parse_rfc3339(start)?;
            let end = parse_rfc3339(end)?;
            if end < start {
                return Err(PlcError::config("end precedes start"));
            }
            Ok(TimeRange::Absolute { start, end })
        }
        other => Err(PlcError::config(format!("unknown range '{other}'"))),
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, PlcError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PlcError::config(format!("bad timestamp '{s}': {e}")))
}
