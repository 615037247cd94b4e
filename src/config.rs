//! Configuration for the PLC endpoint, the time-series store, and the
//! collection schedule.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection parameters for the S7 PLC endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    /// PLC IP address or hostname
    pub host: String,
    /// ISO-on-TCP port (102 on every S7 CPU)
    pub port: u16,
    /// Rack number of the CPU
    pub rack: u16,
    /// Slot number of the CPU
    pub slot: u16,
    /// Timeout for establishing the TCP + COTP + S7 session, in seconds
    pub connect_timeout_secs: u64,
    /// Timeout for each read round trip, in seconds
    pub read_timeout_secs: u64,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.1".to_string(),
            port: 102,
            rack: 0,
            slot: 1,
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
        }
    }
}

impl PlcConfig {
    /// Create a configuration for a PLC at the given host, keeping the
    /// S7-1200 defaults for everything else.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_rack_slot(mut self, rack: u16, slot: u16) -> Self {
        self.rack = rack;
        self.slot = slot;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Connection parameters for the InfluxDB 1.x store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the InfluxDB HTTP API
    pub url: String,
    /// Database name (created on first use if missing)
    pub database: String,
    /// Measurement readings are written to
    pub measurement: String,
    /// Value of the `source` tag attached to every point
    pub source_tag: String,
    /// Retention policy duration applied when the database is created
    pub retention: String,
    /// HTTP request timeout, in seconds
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "plc_data".to_string(),
            measurement: "plc_readings".to_string(),
            source_tag: "plc_s7_1200".to_string(),
            retention: "30d".to_string(),
            timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = measurement.into();
        self
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
