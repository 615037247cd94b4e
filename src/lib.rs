//! # plcwatch - PLC Data Collection Service
//!
//! Polls a Siemens S7 PLC on a fixed interval, persists the readings
//! to InfluxDB, and exposes an HTTP control surface for the dashboard.
//!
//! ## Features
//!
//! - **Periodic collection**: connect, read all channels, format, write;
//!   one cycle at a time, enforced by a single-flight run guard
//! - **S7 protocol client**: ISO-on-TCP session per cycle, symbolic
//!   `DB1,REAL24`-style addressing, bounded by configurable timeouts
//! - **Time-series storage**: InfluxDB 1.x line protocol writes and
//!   InfluxQL range queries, lazy schema initialization
//! - **Web control surface**: start/stop/status/read-now plus bucketed
//!   history queries for the dashboard
//! - **Library + Binary**: embed the service or run `plcwatch serve`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plcwatch::{
//!     AddressMap, AppState, CollectorService, InfluxStore, PlcConfig, S7Client, StoreConfig,
//!     WebConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(S7Client::new(PlcConfig::new("192.168.0.1")));
//!     let store = Arc::new(InfluxStore::new(StoreConfig::default())?);
//!     let service = Arc::new(CollectorService::new(
//!         client,
//!         store.clone(),
//!         AddressMap::s7_1200_default(),
//!     ));
//!
//!     service.clone().start(10);
//!     let state = AppState { service, store };
//!     plcwatch::start_web_server(WebConfig::default(), state).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod plc;
pub mod service;
pub mod store;
pub mod web;

// Re-export public API
pub use config::{PlcConfig, StoreConfig};
pub use error::{PlcError, Result};
pub use plc::{format_reading, Address, AddressMap, ProtocolClient, RawValue, Reading, S7Client};
pub use service::{CollectorService, CollectorStatus, ControlReply, CycleOutcome};
pub use store::{Category, InfluxStore, SeriesPoint, TimeRange, TimeSeriesStore};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// The default collection interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
