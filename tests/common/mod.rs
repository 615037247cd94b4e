//! Shared stubs for integration tests: a canned protocol client and an
//! in-memory store, so no PLC or InfluxDB is needed.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use plcwatch::{
    Address, AddressMap, AppState, Category, CollectorService, PlcError, RawValue, Reading,
    SeriesPoint, TimeRange, TimeSeriesStore,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Protocol client stub answering every address with a fixed value.
pub struct StubClient {
    pub fail: bool,
    pub delay: Duration,
}

impl StubClient {
    pub fn ok() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl plcwatch::ProtocolClient for StubClient {
    async fn read_all(&self, addresses: &[Address]) -> Result<HashMap<Address, RawValue>, PlcError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PlcError::connect("stub: connection refused"));
        }
        Ok(addresses
            .iter()
            .map(|a| (*a, RawValue::Real(21.5)))
            .collect())
    }
}

/// Store stub: records writes, answers queries from canned points.
pub struct StubStore {
    pub writes: Mutex<Vec<Reading>>,
    pub canned: Vec<SeriesPoint>,
}

impl StubStore {
    pub fn empty() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            canned: Vec::new(),
        }
    }

    /// Two temperature points, the second missing T2 (stays null).
    pub fn with_sample_history() -> Self {
        let point = |millis: i64, t2: Option<f64>| {
            let mut fields = BTreeMap::new();
            fields.insert("T1".to_string(), Some(21.0));
            fields.insert("T2".to_string(), t2);
            SeriesPoint {
                time: Utc.timestamp_millis_opt(millis).unwrap(),
                fields,
            }
        };
        Self {
            writes: Mutex::new(Vec::new()),
            canned: vec![point(1_700_000_000_000, Some(22.0)), point(1_700_000_060_000, None)],
        }
    }
}

#[async_trait]
impl TimeSeriesStore for StubStore {
    async fn write(&self, reading: &Reading) -> Result<(), PlcError> {
        self.writes.lock().unwrap().push(reading.clone());
        Ok(())
    }

    async fn query_range(
        &self,
        _category: Category,
        _range: TimeRange,
    ) -> Result<Vec<SeriesPoint>, PlcError> {
        Ok(self.canned.clone())
    }

    async fn latest(&self) -> Result<Option<SeriesPoint>, PlcError> {
        Ok(self.canned.last().cloned())
    }
}

/// Build app state around the given stubs.
pub fn test_state(client: StubClient, store: StubStore) -> AppState {
    let store: Arc<dyn TimeSeriesStore> = Arc::new(store);
    let service = Arc::new(CollectorService::new(
        Arc::new(client),
        store.clone(),
        AddressMap::s7_1200_default(),
    ));
    AppState { service, store }
}
