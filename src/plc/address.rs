//! Symbolic channel addresses and the channel-to-address map.
//!
//! Addresses use the `DB<n>,<TYPE><byte offset>` syntax common to S7
//! tooling, e.g. `DB1,REAL24` for a 32-bit float at byte 24 of data
//! block 1.

use crate::error::PlcError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data type of a PLC variable, fixing its width and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit IEEE float (S7 `REAL`)
    Real,
    /// 32-bit signed integer (S7 `DINT`)
    DInt,
    /// 16-bit signed integer (S7 `INT`)
    Int,
    /// 16-bit unsigned word (S7 `WORD`)
    Word,
}

impl DataType {
    /// Width of the value in bytes on the wire.
    pub fn byte_len(&self) -> u16 {
        match self {
            DataType::Real | DataType::DInt => 4,
            DataType::Int | DataType::Word => 2,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            DataType::Real => "REAL",
            DataType::DInt => "DINT",
            DataType::Int => "INT",
            DataType::Word => "WORD",
        }
    }
}

/// A parsed symbolic address pointing into a PLC data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Data block number
    pub db: u16,
    /// Variable type
    pub data_type: DataType,
    /// Byte offset within the data block
    pub offset: u16,
}

impl FromStr for Address {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, var) = s
            .split_once(',')
            .ok_or_else(|| PlcError::address(format!("missing ',' in '{s}'")))?;

        let db = block
            .strip_prefix("DB")
            .and_then(|n| n.parse::<u16>().ok())
            .ok_or_else(|| PlcError::address(format!("bad data block in '{s}'")))?;

        // Longest keyword first so REAL does not match as an INT prefix.
        let (data_type, rest) = if let Some(rest) = var.strip_prefix("REAL") {
            (DataType::Real, rest)
        } else if let Some(rest) = var.strip_prefix("DINT") {
            (DataType::DInt, rest)
        } else if let Some(rest) = var.strip_prefix("INT") {
            (DataType::Int, rest)
        } else if let Some(rest) = var.strip_prefix("WORD") {
            (DataType::Word, rest)
        } else {
            return Err(PlcError::address(format!("unknown type in '{s}'")));
        };

        let offset = rest
            .parse::<u16>()
            .map_err(|_| PlcError::address(format!("bad offset in '{s}'")))?;

        Ok(Address {
            db,
            data_type,
            offset,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DB{},{}{}", self.db, self.data_type.keyword(), self.offset)
    }
}

/// Ordered, read-only mapping from channel name to PLC address.
///
/// Fixed at configuration time; iteration order is the order channels
/// were added, which keeps the write schema stable across cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressMap {
    channels: Vec<(String, Address)>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel layout of the original S7-1200 deployment: ten
    /// temperature probes, two humidity probes, and one air speed
    /// sensor, packed as consecutive REALs in DB1.
    pub fn s7_1200_default() -> Self {
        let mut map = Self::new();
        for (i, offset) in (24u16..=60).step_by(4).enumerate() {
            map.insert(format!("T{}", i + 1), real(1, offset));
        }
        map.insert("H1", real(1, 64));
        map.insert("H2", real(1, 68));
        map.insert("Air_Speed", real(1, 72));
        map
    }

    /// Parse a `name = "DBn,TYPEoffset"` listing into a map.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, PlcError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut map = Self::new();
        for (name, addr) in pairs {
            map.insert(name, addr.parse()?);
        }
        Ok(map)
    }

    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.channels.push((name.into(), address));
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.channels.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// All addresses, in channel order, for a bulk read.
    pub fn addresses(&self) -> Vec<Address> {
        self.channels.iter().map(|(_, a)| *a).collect()
    }
}

fn real(db: u16, offset: u16) -> Address {
    Address {
        db,
        data_type: DataType::Real,
        offset,
    }
}
