//! Error types for the PLC collection service.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlcError>;

/// Errors produced by the protocol client, store adapter, and collector.
#[derive(Debug, Error)]
pub enum PlcError {
    /// The PLC endpoint could not be reached or refused the session.
    #[error("PLC connection failed: {0}")]
    Connect(String),

    /// The PLC answered, but the read was malformed or incomplete.
    #[error("PLC read failed: {0}")]
    Read(String),

    /// The time-series store rejected or never received a write.
    #[error("store write failed: {0}")]
    Write(String),

    /// A range query against the time-series store failed.
    #[error("store query failed: {0}")]
    Query(String),

    /// A collection cycle is already in flight.
    #[error("a collection cycle is already in progress")]
    Busy,

    /// A symbolic channel address could not be parsed.
    #[error("invalid channel address: {0}")]
    Address(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Web server startup or bind failure.
    #[error("web server error: {0}")]
    WebServer(String),
}

impl PlcError {
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn address(msg: impl Into<String>) -> Self {
        Self::Address(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn web_server(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether this error came from the protocol side of a cycle
    /// (as opposed to the store side).
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Read(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlcError::connect("connection refused");
        assert_eq!(err.to_string(), "PLC connection failed: connection refused");

        let err = PlcError::Busy;
        assert!(err.to_string().contains("already in progress"));
    }

    #[test]
    fn test_is_protocol() {
        assert!(PlcError::connect("x").is_protocol());
        assert!(PlcError::read("x").is_protocol());
        assert!(!PlcError::write("x").is_protocol());
        assert!(!PlcError::Busy.is_protocol());
    }
}
