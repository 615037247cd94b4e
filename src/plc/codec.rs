//! S7comm frame building and parsing (ISO-on-TCP, RFC 1006).
//!
//! Protocol-only: each function builds exactly one request frame or
//! parses exactly one response frame. No sockets, no retries, no
//! state; the client in [`crate::plc::client`] owns the transport.
//!
//! Frame nesting is TPKT -> COTP -> S7 PDU. All integers big-endian.

use crate::error::PlcError;
use crate::plc::address::{Address, DataType};
use crate::plc::reading::RawValue;

/// TPKT version byte.
const TPKT_VERSION: u8 = 0x03;
/// COTP DT TPDU prefix used for every S7 exchange after connect.
const COTP_DT: [u8; 3] = [0x02, 0xF0, 0x80];
/// S7 protocol id.
const S7_PROTOCOL_ID: u8 = 0x32;
/// ROSCTR: job request.
const ROSCTR_JOB: u8 = 0x01;
/// ROSCTR: acknowledgement with data.
const ROSCTR_ACK_DATA: u8 = 0x03;
/// Function code: setup communication.
const FN_SETUP: u8 = 0xF0;
/// Function code: read variable.
const FN_READ_VAR: u8 = 0x04;
/// Per-item success return code in a read response.
const ITEM_OK: u8 = 0xFF;
/// PDU size we ask for during negotiation.
const REQUESTED_PDU_LEN: u16 = 960;

/// Read requests are chunked so each PDU stays under the negotiated
/// size even before negotiation completes.
pub const MAX_ITEMS_PER_READ: usize = 18;

/// Size of the TPKT header prefixing every packet.
pub const TPKT_HEADER_LEN: usize = 4;

/// Extract the total packet length from a TPKT header.
pub fn tpkt_packet_len(header: &[u8; TPKT_HEADER_LEN]) -> Result<usize, PlcError> {
    if header[0] != TPKT_VERSION {
        return Err(PlcError::read(format!(
            "bad TPKT version 0x{:02x}",
            header[0]
        )));
    }
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    if len < TPKT_HEADER_LEN {
        return Err(PlcError::read(format!("TPKT length {len} too short")));
    }
    Ok(len)
}

fn tpkt_wrap(payload: &[u8]) -> Vec<u8> {
    let total = (TPKT_HEADER_LEN + payload.len()) as u16;
    let mut frame = Vec::with_capacity(total as usize);
    frame.extend_from_slice(&[TPKT_VERSION, 0x00]);
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Build the COTP connection request for a CPU at the given rack/slot.
///
/// The called TSAP encodes the rack and slot the way S7 engineering
/// tools do: `0x01, rack * 0x20 + slot`.
pub fn cotp_connect_request(rack: u16, slot: u16) -> Vec<u8> {
    let remote_tsap = ((rack as u8) << 5) | (slot as u8 & 0x1F);
    let cotp: [u8; 18] = [
        0x11, // length of COTP part after this byte
        0xE0, // CR TPDU
        0x00, 0x00, // destination reference
        0x00, 0x01, // source reference
        0x00, // class 0
        0xC0, 0x01, 0x0A, // TPDU size parameter: 1024
        0xC1, 0x02, 0x01, 0x00, // calling TSAP
        0xC2, 0x02, 0x01, remote_tsap, // called TSAP
    ];
    tpkt_wrap(&cotp)
}

/// Validate a COTP connection confirm packet.
pub fn parse_cotp_connect_confirm(packet: &[u8]) -> Result<(), PlcError> {
    if packet.len() < 6 {
        return Err(PlcError::connect("COTP confirm truncated"));
    }
    match packet[5] {
        0xD0 => Ok(()),
        code => Err(PlcError::connect(format!(
            "COTP connect rejected (TPDU 0x{code:02x})"
        ))),
    }
}

fn s7_header(rosctr: u8, pdu_ref: u16, param_len: u16, data_len: u16) -> [u8; 10] {
    let r = pdu_ref.to_be_bytes();
    let p = param_len.to_be_bytes();
    let d = data_len.to_be_bytes();
    [
        S7_PROTOCOL_ID,
        rosctr,
        0x00,
        0x00, // redundancy id
        r[0],
        r[1],
        p[0],
        p[1],
        d[0],
        d[1],
    ]
}

/// Build the S7 setup-communication request that negotiates PDU size.
pub fn setup_request(pdu_ref: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(25);
    payload.extend_from_slice(&COTP_DT);
    payload.extend_from_slice(&s7_header(ROSCTR_JOB, pdu_ref, 8, 0));
    payload.push(FN_SETUP);
    payload.push(0x00); // reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // max AMQ caller
    payload.extend_from_slice(&1u16.to_be_bytes()); // max AMQ callee
    payload.extend_from_slice(&REQUESTED_PDU_LEN.to_be_bytes());
    tpkt_wrap(&payload)
}

/// Parse a setup-communication response, returning the negotiated PDU
/// length.
pub fn parse_setup_response(packet: &[u8]) -> Result<u16, PlcError> {
    let pdu = s7_pdu(packet).map_err(|e| PlcError::connect(e.to_string()))?;
    if pdu.rosctr != ROSCTR_ACK_DATA {
        return Err(PlcError::connect(format!(
            "unexpected ROSCTR 0x{:02x} in setup response",
            pdu.rosctr
        )));
    }
    if pdu.error != (0, 0) {
        return Err(PlcError::connect(format!(
            "setup rejected (class 0x{:02x}, code 0x{:02x})",
            pdu.error.0, pdu.error.1
        )));
    }
    if pdu.params.len() < 8 || pdu.params[0] != FN_SETUP {
        return Err(PlcError::connect("malformed setup response parameters"));
    }
    Ok(u16::from_be_bytes([pdu.params[6], pdu.params[7]]))
}

/// Build a read-var request for up to [`MAX_ITEMS_PER_READ`] items.
pub fn read_request(pdu_ref: u16, items: &[Address]) -> Result<Vec<u8>, PlcError> {
    if items.is_empty() || items.len() > MAX_ITEMS_PER_READ {
        return Err(PlcError::read(format!(
            "read request must carry 1..={MAX_ITEMS_PER_READ} items, got {}",
            items.len()
        )));
    }
    let param_len = (2 + 12 * items.len()) as u16;
    let mut payload = Vec::with_capacity(TPKT_HEADER_LEN + 13 + param_len as usize);
    payload.extend_from_slice(&COTP_DT);
    payload.extend_from_slice(&s7_header(ROSCTR_JOB, pdu_ref, param_len, 0));
    payload.push(FN_READ_VAR);
    payload.push(items.len() as u8);
    for item in items {
        let bit_offset = (item.offset as u32) * 8;
        payload.push(0x12); // variable specification
        payload.push(0x0A); // length of the following address block
        payload.push(0x10); // syntax id: S7ANY
        payload.push(0x02); // transport size: BYTE
        payload.extend_from_slice(&item.data_type.byte_len().to_be_bytes());
        payload.extend_from_slice(&item.db.to_be_bytes());
        payload.push(0x84); // area: data block
        payload.extend_from_slice(&bit_offset.to_be_bytes()[1..4]);
    }
    Ok(tpkt_wrap(&payload))
}

/// Parse a read-var response into one [`RawValue`] per requested item.
///
/// Any item-level failure, length mismatch, or truncation fails the
/// whole read; a partial result is never surfaced as data.
pub fn parse_read_response(packet: &[u8], items: &[Address]) -> Result<Vec<RawValue>, PlcError> {
    let pdu = s7_pdu(packet)?;
    if pdu.rosctr != ROSCTR_ACK_DATA {
        return Err(PlcError::read(format!(
            "unexpected ROSCTR 0x{:02x} in read response",
            pdu.rosctr
        )));
    }
    if pdu.error != (0, 0) {
        return Err(PlcError::read(format!(
            "read rejected (class 0x{:02x}, code 0x{:02x})",
            pdu.error.0, pdu.error.1
        )));
    }
    if pdu.params.len() < 2 || pdu.params[0] != FN_READ_VAR {
        return Err(PlcError::read("malformed read response parameters"));
    }
    let item_count = pdu.params[1] as usize;
    if item_count != items.len() {
        return Err(PlcError::read(format!(
            "expected {} items, device answered {}",
            items.len(),
            item_count
        )));
    }

    let data = pdu.data;
    let mut pos = 0usize;
    let mut values = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if data.len() < pos + 4 {
            return Err(PlcError::read(format!("data truncated at item {idx}")));
        }
        let ret_code = data[pos];
        let transport = data[pos + 1];
        let len_raw = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if ret_code != ITEM_OK {
            return Err(PlcError::read(format!(
                "item {idx} ({item}) failed with return code 0x{ret_code:02x}"
            )));
        }
        // Transport sizes 0x03/0x04/0x05 count bits, others count bytes.
        let byte_len = match transport {
            0x03 | 0x04 | 0x05 => len_raw / 8,
            _ => len_raw,
        };
        if byte_len != item.data_type.byte_len() as usize {
            return Err(PlcError::read(format!(
                "item {idx} ({item}) returned {byte_len} bytes, expected {}",
                item.data_type.byte_len()
            )));
        }
        if data.len() < pos + byte_len {
            return Err(PlcError::read(format!("data truncated at item {idx}")));
        }
        values.push(decode_value(item.data_type, &data[pos..pos + byte_len]));
        pos += byte_len;
        // Data items are padded to even offsets, except after the last.
        if byte_len % 2 == 1 && idx + 1 < items.len() {
            pos += 1;
        }
    }
    Ok(values)
}

fn decode_value(data_type: DataType, bytes: &[u8]) -> RawValue {
    match data_type {
        DataType::Real => {
            RawValue::Real(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        DataType::DInt => {
            RawValue::DInt(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        DataType::Int => RawValue::Int(i16::from_be_bytes([bytes[0], bytes[1]])),
        DataType::Word => RawValue::Word(u16::from_be_bytes([bytes[0], bytes[1]])),
    }
}

/// Decoded S7 PDU sections of a response packet.
struct S7Pdu<'a> {
    rosctr: u8,
    error: (u8, u8),
    params: &'a [u8],
    data: &'a [u8],
}

fn s7_pdu(packet: &[u8]) -> Result<S7Pdu<'_>, PlcError> {
    // TPKT (4) + COTP DT (3) before the S7 header.
    let body = packet
        .get(TPKT_HEADER_LEN + 3..)
        .ok_or_else(|| PlcError::read("packet too short for S7 header"))?;
    if body.len() < 10 || body[0] != S7_PROTOCOL_ID {
        return Err(PlcError::read("missing S7 header"));
    }
    let rosctr = body[1];
    let param_len = u16::from_be_bytes([body[6], body[7]]) as usize;
    let data_len = u16::from_be_bytes([body[8], body[9]]) as usize;
    // Ack-data headers carry a 2-byte error field after the fixed part.
    let (error, header_len) = if rosctr == ROSCTR_ACK_DATA {
        if body.len() < 12 {
            return Err(PlcError::read("truncated ack-data header"));
        }
        ((body[10], body[11]), 12)
    } else {
        ((0, 0), 10)
    };
    let params_end = header_len + param_len;
    let data_end = params_end + data_len;
    if body.len() < data_end {
        return Err(PlcError::read("S7 PDU shorter than its declared length"));
    }
    Ok(S7Pdu {
        rosctr,
        error,
        params: &body[header_len..params_end],
        data: &body[params_end..data_end],
    })
}
