//! Async S7 protocol client.
//!
//! One scoped session per call: connect, negotiate, read everything,
//! disconnect. The socket is owned by the call, so the session is
//! released on every exit path. Retry policy belongs to the caller.

use crate::config::PlcConfig;
use crate::error::PlcError;
use crate::plc::address::Address;
use crate::plc::codec::{self, MAX_ITEMS_PER_READ, TPKT_HEADER_LEN};
use crate::plc::reading::RawValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Seam between the collector service and the wire protocol.
///
/// Implementations perform a single bulk read per call with no internal
/// retries. A partial read must surface as an error, never as data.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Connect, read all addresses, and disconnect.
    async fn read_all(&self, addresses: &[Address]) -> Result<HashMap<Address, RawValue>, PlcError>;
}

/// Production client speaking S7comm over ISO-on-TCP.
pub struct S7Client {
    config: PlcConfig,
}

/// An established, negotiated S7 session. Dropping it closes the socket.
struct S7Session {
    stream: TcpStream,
    pdu_ref: u16,
}

impl S7Client {
    pub fn new(config: PlcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlcConfig {
        &self.config
    }

    /// Open the TCP connection, complete the COTP handshake, and
    /// negotiate S7 communication parameters.
    async fn connect(&self) -> Result<S7Session, PlcError> {
        let endpoint = format!("{}:{}", self.config.host, self.config.port);
        let deadline = self.config.connect_timeout();

        let mut stream = timeout(deadline, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| PlcError::connect(format!("timeout connecting to {endpoint}")))?
            .map_err(|e| PlcError::connect(format!("{endpoint}: {e}")))?;

        let cr = codec::cotp_connect_request(self.config.rack, self.config.slot);
        let confirm = exchange(&mut stream, &cr, deadline, "COTP connect").await?;
        codec::parse_cotp_connect_confirm(&confirm)?;

        let mut session = S7Session { stream, pdu_ref: 1 };
        let setup = codec::setup_request(session.next_ref());
        let response = exchange(&mut session.stream, &setup, deadline, "S7 setup").await?;
        let pdu_len = codec::parse_setup_response(&response)?;
        debug!(endpoint = %endpoint, pdu_len, "S7 session established");

        Ok(session)
    }
}

impl S7Session {
    fn next_ref(&mut self) -> u16 {
        let r = self.pdu_ref;
        self.pdu_ref = self.pdu_ref.wrapping_add(1);
        r
    }
}

#[async_trait]
impl ProtocolClient for S7Client {
    async fn read_all(&self, addresses: &[Address]) -> Result<HashMap<Address, RawValue>, PlcError> {
        let mut session = self.connect().await?;
        let read_deadline = self.config.read_timeout();

        let mut raw = HashMap::with_capacity(addresses.len());
        for chunk in addresses.chunks(MAX_ITEMS_PER_READ) {
            let request = codec::read_request(session.next_ref(), chunk)?;
            let response =
                exchange(&mut session.stream, &request, read_deadline, "read var").await?;
            let values = codec::parse_read_response(&response, chunk)?;
            for (address, value) in chunk.iter().zip(values) {
                raw.insert(*address, value);
            }
        }

        // Session drops here, closing the socket.
        Ok(raw)
    }
}

/// Send one frame and receive one TPKT-framed response, bounded by
/// `deadline`.
async fn exchange(
    stream: &mut TcpStream,
    frame: &[u8],
    deadline: Duration,
    what: &str,
) -> Result<Vec<u8>, PlcError> {
    timeout(deadline, async {
        stream
            .write_all(frame)
            .await
            .map_err(|e| io_error(what, e))?;

        let mut header = [0u8; TPKT_HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| io_error(what, e))?;
        let total = codec::tpkt_packet_len(&header)?;

        let mut packet = vec![0u8; total];
        packet[..TPKT_HEADER_LEN].copy_from_slice(&header);
        stream
            .read_exact(&mut packet[TPKT_HEADER_LEN..])
            .await
            .map_err(|e| io_error(what, e))?;
        Ok(packet)
    })
    .await
    .map_err(|_| timeout_error(what))?
}

fn io_error(what: &str, e: std::io::Error) -> PlcError {
    if what.contains("read") {
        PlcError::read(format!("{what}: {e}"))
    } else {
        PlcError::connect(format!("{what}: {e}"))
    }
}

fn timeout_error(what: &str) -> PlcError {
    if what.contains("read") {
        PlcError::read(format!("{what}: timeout"))
    } else {
        PlcError::connect(format!("{what}: timeout"))
    }
}
