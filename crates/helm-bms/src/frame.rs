//! Byte-exact framing for the battery management UART.
//!
//! Request:  `DD A5 <cmd> 00 <ckHi> <ckLo> 77`
//! Response: `DD <cmd> <status> <len> <payload..len> <ckHi> <ckLo> 77`

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BmsError;

pub const START: u8 = 0xDD;
pub const END: u8 = 0x77;
pub const OP_READ: u8 = 0xA5;
pub const STATUS_OK: u8 = 0x00;

pub const CMD_BASIC_INFO: u8 = 0x03;

pub const REQUEST_LEN: usize = 7;
/// Start, command, status, length, two checksum bytes and the end marker.
pub const RESPONSE_OVERHEAD: usize = 7;
/// Bytes needed before a terminator can end a response.
pub const MIN_TERMINATED_LEN: usize = 4;

/// Two's complement of the wrapping 16-bit byte sum.
pub fn checksum(bytes: &[u8]) -> u16 {
    let sum = bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    (!sum).wrapping_add(1)
}

pub fn verify(bytes: &[u8], expected: u16) -> bool {
    checksum(bytes) == expected
}

pub fn encode_request(command: u8) -> [u8; REQUEST_LEN] {
    let ck = checksum(&[command, 0x00]).to_be_bytes();
    [START, OP_READ, command, 0x00, ck[0], ck[1], END]
}

/// Returns the command byte of a well-formed read request.
pub fn decode_request(frame: &[u8]) -> Result<u8, BmsError> {
    if frame.len() != REQUEST_LEN {
        return Err(BmsError::LengthMismatch { declared: REQUEST_LEN, actual: frame.len() });
    }
    if frame[0] != START || frame[6] != END {
        return Err(BmsError::Malformed("bad request delimiters"));
    }
    if frame[1] != OP_READ {
        return Err(BmsError::Malformed("unsupported request op"));
    }
    let received = u16::from_be_bytes([frame[4], frame[5]]);
    if !verify(&frame[2..4], received) {
        return Err(BmsError::ChecksumMismatch { computed: checksum(&frame[2..4]), received });
    }
    Ok(frame[2])
}

/// Device side of the exchange; the checksum covers status, length and payload.
/// The length field is one byte, so payloads are capped at 255 bytes.
pub fn encode_response(command: u8, status: u8, payload: &[u8]) -> Bytes {
    debug_assert!(payload.len() <= u8::MAX as usize, "bms payload of {} bytes", payload.len());
    let mut out = BytesMut::with_capacity(RESPONSE_OVERHEAD + payload.len());
    out.put_u8(START);
    out.put_u8(command);
    out.put_u8(status);
    out.put_u8(payload.len() as u8);
    out.put_slice(payload);
    let ck = checksum(&out[2..]);
    out.put_u16(ck);
    out.put_u8(END);
    out.freeze()
}

/// True once the accumulated bytes may hold a complete response.
///
/// With a valid start byte the header's length field decides: a 0x77 inside
/// the payload or checksum does not end the frame. Without one, any
/// terminator does, and `parse_response` reports the garbage.
pub fn is_terminated(buf: &[u8]) -> bool {
    if buf.len() < MIN_TERMINATED_LEN || buf.last() != Some(&END) {
        return false;
    }
    buf[0] != START || buf.len() >= RESPONSE_OVERHEAD + buf[3] as usize
}

/// Validates a response to `command` and returns its payload.
pub fn parse_response(command: u8, frame: &[u8]) -> Result<&[u8], BmsError> {
    if frame.len() < MIN_TERMINATED_LEN {
        return Err(BmsError::Malformed("frame shorter than header"));
    }
    if frame[0] != START {
        return Err(BmsError::Malformed("bad start byte"));
    }
    if frame[frame.len() - 1] != END {
        return Err(BmsError::Malformed("bad end byte"));
    }
    if frame[1] != command {
        return Err(BmsError::CommandMismatch { expected: command, got: frame[1] });
    }
    if frame[2] != STATUS_OK {
        return Err(BmsError::DeviceError(frame[2]));
    }
    let declared = frame[3] as usize;
    if frame.len() != RESPONSE_OVERHEAD + declared {
        return Err(BmsError::LengthMismatch {
            declared,
            actual: frame.len().saturating_sub(RESPONSE_OVERHEAD),
        });
    }

    let body_end = 4 + declared;
    let received = u16::from_be_bytes([frame[body_end], frame[body_end + 1]]);
    let covered = &frame[2..body_end];
    if !verify(covered, received) {
        return Err(BmsError::ChecksumMismatch { computed: checksum(covered), received });
    }
    Ok(&frame[4..body_end])
}

/// Fields of the basic info (0x03) payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicInfo {
    pub total_voltage_v: f32,
    pub current_a: f32,
    /// Relative state of charge, percent.
    pub rsoc: u8,
}

impl BasicInfo {
    pub const RSOC_OFFSET: usize = 19;

    pub fn from_payload(payload: &[u8]) -> Result<Self, BmsError> {
        let needed = Self::RSOC_OFFSET + 1;
        if payload.len() < needed {
            return Err(BmsError::PayloadTooShort { needed, len: payload.len() });
        }
        // 10 mV and 10 mA units
        let total_voltage_v = u16::from_be_bytes([payload[0], payload[1]]) as f32 / 100.0;
        let current_a = i16::from_be_bytes([payload[2], payload[3]]) as f32 / 100.0;
        Ok(Self { total_voltage_v, current_a, rsoc: payload[Self::RSOC_OFFSET] })
    }
}
