//! Expedited SDO transfers as carried in one 8-byte CAN frame.
//!
//! Byte 0 is the command specifier, bytes 1..4 the register multiplexer (index LE, sub-index)
//! and bytes 4..8 the payload, little-endian and zero padded.

use crate::{AbortCode, CodecError, Register, Result};

pub const FRAME_LEN: usize = 8;

/// Upload (read) request.
pub const CMD_READ: u8 = 0x40;
pub const CMD_WRITE_1: u8 = 0x2F;
pub const CMD_WRITE_2: u8 = 0x2B;
pub const CMD_WRITE_4: u8 = 0x23;

pub const RESP_READ_1: u8 = 0x4F;
pub const RESP_READ_2: u8 = 0x4B;
pub const RESP_READ_4: u8 = 0x43;
/// Download (write) acknowledgement.
pub const RESP_WRITE_ACK: u8 = 0x60;
pub const RESP_ABORT: u8 = 0x80;

/// Base COB-IDs; add the node id.
pub const COB_REQUEST_BASE: u16 = 0x600;
pub const COB_RESPONSE_BASE: u16 = 0x580;

/// Build an upload request for `register`.
pub fn encode_read(register: Register) -> [u8; FRAME_LEN] {
    let mux = register.mux();
    [CMD_READ, mux[0], mux[1], mux[2], 0, 0, 0, 0]
}

/// Command specifier for a write of `len` payload bytes.
pub fn write_command(len: u8) -> Result<u8> {
    match len {
        1 => Ok(CMD_WRITE_1),
        2 => Ok(CMD_WRITE_2),
        4 => Ok(CMD_WRITE_4),
        other => Err(CodecError::Usage(format!(
            "write length must be 1, 2 or 4 bytes, got {other}"
        ))),
    }
}

/// Upload response class expected for a read of `len` bytes.
pub fn read_response_class(len: u8) -> u8 {
    match len {
        1 => RESP_READ_1,
        2 => RESP_READ_2,
        _ => RESP_READ_4,
    }
}

/// Build a download request writing the low `len` bytes of `value` to `register`.
pub fn encode_write(register: Register, value: u32, len: u8) -> Result<[u8; FRAME_LEN]> {
    let cmd = write_command(len)?;
    let mux = register.mux();
    let mut out = [cmd, mux[0], mux[1], mux[2], 0, 0, 0, 0];
    let bytes = value.to_le_bytes();
    let n = usize::from(len);
    out[4..4 + n].copy_from_slice(&bytes[..n]);
    Ok(out)
}

/// Register multiplexer echoed in a response, if the frame is long enough to carry one.
pub fn response_mux(data: &[u8]) -> Option<(u16, u8)> {
    if data.len() < 4 {
        return None;
    }
    Some((u16::from_le_bytes([data[1], data[2]]), data[3]))
}

fn payload_u32(data: &[u8]) -> Result<u32> {
    match data.get(4..8) {
        Some(p) => Ok(u32::from_le_bytes([p[0], p[1], p[2], p[3]])),
        None => Err(CodecError::MalformedResponse(format!(
            "expected {FRAME_LEN} bytes, got {}",
            data.len()
        ))),
    }
}

/// Classify an upload response and extract its value.
///
/// An empty slice means nothing arrived before the deadline.
pub fn decode_response(data: &[u8]) -> Result<u32> {
    let Some(&class) = data.first() else {
        return Err(CodecError::Timeout);
    };
    let raw = payload_u32(data)?;
    match class {
        RESP_READ_1 => Ok(raw & 0xFF),
        RESP_READ_2 => Ok(raw & 0xFFFF),
        RESP_READ_4 => Ok(raw),
        RESP_ABORT => Err(CodecError::DeviceAbort(AbortCode(raw))),
        other => Err(CodecError::MalformedResponse(format!(
            "unexpected response class 0x{other:02X}"
        ))),
    }
}

/// Classify the drive's answer to a download request.
pub fn decode_write_ack(data: &[u8]) -> Result<()> {
    let Some(&class) = data.first() else {
        return Err(CodecError::Timeout);
    };
    match class {
        RESP_WRITE_ACK => Ok(()),
        RESP_ABORT => Err(CodecError::DeviceAbort(AbortCode(payload_u32(data)?))),
        other => Err(CodecError::MalformedResponse(format!(
            "unexpected write acknowledgement 0x{other:02X}"
        ))),
    }
}
