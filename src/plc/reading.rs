//! Typed protocol values and the per-cycle reading record.

use crate::plc::address::{Address, AddressMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A raw value as decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// 32-bit float (S7 REAL)
    Real(f32),
    /// 32-bit signed integer (S7 DINT)
    DInt(i32),
    /// 16-bit signed integer (S7 INT)
    Int(i16),
    /// 16-bit unsigned word (S7 WORD)
    Word(u16),
    /// The device did not answer this address.
    Missing,
}

impl RawValue {
    /// Numeric value, if the variant carries a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            RawValue::Real(v) if v.is_finite() => Some(v as f64),
            RawValue::Real(_) => None,
            RawValue::DInt(v) => Some(v as f64),
            RawValue::Int(v) => Some(v as f64),
            RawValue::Word(v) => Some(v as f64),
            RawValue::Missing => None,
        }
    }
}

/// One complete sample of all configured channels at a single instant.
///
/// Built once per collection cycle and immutable afterwards. Every
/// channel from the address map is present with a finite value, so the
/// write schema is identical for every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Channel name to value, in address-map order
    #[serde(with = "channel_map")]
    pub channels: Vec<(String, f64)>,
}

/// Serialize the channel list as a JSON object (`{"T1": 21.5, ...}`),
/// the shape dashboard consumers expect, while keeping insertion order
/// internally.
mod channel_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(channels: &[(String, f64)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(channels.len()))?;
        for (name, value) in channels {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, f64)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChannelVisitor;

        impl<'de> Visitor<'de> for ChannelVisitor {
            type Value = Vec<(String, f64)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of channel names to numeric values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut channels = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry()? {
                    channels.push(entry);
                }
                Ok(channels)
            }
        }

        deserializer.deserialize_map(ChannelVisitor)
    }
}

impl Reading {
    /// Look up a channel value by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Build a [`Reading`] from raw protocol output.
///
/// For every channel in the map: absent, missing, or non-finite raw
/// values become `0.0` instead of being dropped, so every cycle writes
/// the same set of fields.
pub fn format_reading(
    raw: &HashMap<Address, RawValue>,
    address_map: &AddressMap,
    timestamp: DateTime<Utc>,
) -> Reading {
    let channels = address_map
        .iter()
        .map(|(name, address)| {
            let value = raw
                .get(address)
                .and_then(RawValue::as_f64)
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            (name.to_string(), value)
        })
        .collect();

    Reading {
        timestamp,
        channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn small_map() -> AddressMap {
        AddressMap::from_pairs([
            ("T1", "DB1,REAL24"),
            ("T2", "DB1,REAL28"),
            ("H1", "DB1,REAL64"),
        ])
        .unwrap()
    }

    #[test]
    fn test_format_passes_values_through() {
        let map = small_map();
        let mut raw = HashMap::new();
        raw.insert(addr("DB1,REAL24"), RawValue::Real(21.5));
        raw.insert(addr("DB1,REAL28"), RawValue::Real(-3.25));
        raw.insert(addr("DB1,REAL64"), RawValue::Real(55.0));

        let reading = format_reading(&raw, &map, Utc::now());
        assert_eq!(reading.get("T1"), Some(21.5));
        assert_eq!(reading.get("T2"), Some(-3.25));
        assert_eq!(reading.get("H1"), Some(55.0));
    }

    #[test]
    fn test_format_substitutes_zero_for_missing() {
        let map = small_map();
        let mut raw = HashMap::new();
        raw.insert(addr("DB1,REAL24"), RawValue::Real(21.5));
        // T2 absent entirely, H1 answered as Missing.
        raw.insert(addr("DB1,REAL64"), RawValue::Missing);

        let reading = format_reading(&raw, &map, Utc::now());
        assert_eq!(reading.len(), 3);
        assert_eq!(reading.get("T1"), Some(21.5));
        assert_eq!(reading.get("T2"), Some(0.0));
        assert_eq!(reading.get("H1"), Some(0.0));
    }

    #[test]
    fn test_format_substitutes_zero_for_non_finite() {
        let map = small_map();
        let mut raw = HashMap::new();
        raw.insert(addr("DB1,REAL24"), RawValue::Real(f32::NAN));
        raw.insert(addr("DB1,REAL28"), RawValue::Real(f32::INFINITY));
        raw.insert(addr("DB1,REAL64"), RawValue::Real(1.0));

        let reading = format_reading(&raw, &map, Utc::now());
        assert_eq!(reading.get("T1"), Some(0.0));
        assert_eq!(reading.get("T2"), Some(0.0));
        assert_eq!(reading.get("H1"), Some(1.0));
        assert!(reading.channels.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_format_preserves_channel_order() {
        let map = AddressMap::s7_1200_default();
        let raw = HashMap::new();
        let reading = format_reading(&raw, &map, Utc::now());

        let names: Vec<_> = reading.channels.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names[0], "T1");
        assert_eq!(names[9], "T10");
        assert_eq!(names[12], "Air_Speed");
        // All zero-filled since the raw map was empty.
        assert!(reading.channels.iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn test_reading_serializes_channels_as_object() {
        let map = small_map();
        let mut raw = HashMap::new();
        raw.insert(addr("DB1,REAL24"), RawValue::Real(21.5));
        raw.insert(addr("DB1,REAL28"), RawValue::Real(3.0));
        raw.insert(addr("DB1,REAL64"), RawValue::Real(55.0));
        let reading = format_reading(&raw, &map, Utc::now());

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["channels"]["T1"], 21.5);
        assert_eq!(json["channels"]["H1"], 55.0);
        assert_eq!(json["channels"].as_object().unwrap().len(), 3);

        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back.get("T2"), Some(3.0));
    }

    #[test]
    fn test_raw_value_conversions() {
        assert_eq!(RawValue::Int(-12).as_f64(), Some(-12.0));
        assert_eq!(RawValue::Word(65535).as_f64(), Some(65535.0));
        assert_eq!(RawValue::DInt(1 << 20).as_f64(), Some(1048576.0));
        assert_eq!(RawValue::Real(f32::NAN).as_f64(), None);
        assert_eq!(RawValue::Missing.as_f64(), None);
    }
}
