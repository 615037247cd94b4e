//! PLC protocol layer: symbolic addresses, the S7 wire codec, the async
//! client, and the reading formatter.

pub mod address;
pub mod client;
pub mod codec;
pub mod reading;

// Re-export commonly used items
pub use address::{Address, AddressMap, DataType};
pub use client::{ProtocolClient, S7Client};
pub use reading::{format_reading, RawValue, Reading};
