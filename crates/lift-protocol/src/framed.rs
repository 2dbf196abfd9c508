//! RS-232 framing: `0x7F`, the 8 SDO bytes, then an LRC byte.
//!
//! The LRC makes the byte sum of the whole 10-byte frame zero modulo 256. Responses are located
//! in the incoming stream by [`FrameScanner`], which tolerates garbage and stale frames between
//! the request and the answer it is waiting for.

use crate::{sdo, AbortCode, CodecError, Register, Result};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Instant;

pub const SYNC: u8 = 0x7F;
pub const FRAME_LEN: usize = 10;
/// Sync byte, response class and the three multiplexer bytes.
const HEADER_LEN: usize = 5;

/// Longitudinal redundancy check over `bytes`.
pub fn lrc(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// True when the frame's byte sum is zero modulo 256.
pub fn lrc_valid(frame: &[u8]) -> bool {
    frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

/// Wrap 8 SDO bytes into a serial frame.
pub fn wrap(sdo_bytes: [u8; sdo::FRAME_LEN]) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = SYNC;
    out[1..9].copy_from_slice(&sdo_bytes);
    out[9] = lrc(&out[..9]);
    out
}

pub fn encode_read(register: Register) -> [u8; FRAME_LEN] {
    wrap(sdo::encode_read(register))
}

pub fn encode_write(register: Register, value: u32, len: u8) -> Result<[u8; FRAME_LEN]> {
    Ok(wrap(sdo::encode_write(register, value, len)?))
}

/// The header bytes after the sync byte that identify the awaited response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Markers {
    /// Response class (e.g. `0x43` for a 4-byte upload).
    pub class: u8,
    /// Index (little-endian) and sub-index of the register.
    pub mux: [u8; 3],
}

impl Markers {
    /// Markers of the upload response to a read of `register`.
    pub fn for_read(register: Register) -> Self {
        Self {
            class: sdo::read_response_class(register.len),
            mux: register.mux(),
        }
    }

    /// An abort for the same register is accepted as well, so it can be reported.
    pub fn accepts(&self, class: u8, mux: &[u8]) -> bool {
        (class == self.class || class == sdo::RESP_ABORT) && mux == self.mux
    }
}

/// Validate a complete response frame and extract its signed payload.
pub fn decode_frame(frame: &[u8; FRAME_LEN], markers: Markers) -> Result<i32> {
    if frame[0] != SYNC {
        return Err(CodecError::MalformedResponse(format!(
            "missing sync byte, got 0x{:02X}",
            frame[0]
        )));
    }
    if !markers.accepts(frame[1], &frame[2..HEADER_LEN]) {
        return Err(CodecError::MalformedResponse(format!(
            "header {:02X?} does not match class 0x{:02X} mux {:02X?}",
            &frame[1..HEADER_LEN],
            markers.class,
            markers.mux
        )));
    }
    let computed = lrc(&frame[..FRAME_LEN - 1]);
    if computed != frame[FRAME_LEN - 1] {
        return Err(CodecError::ChecksumMismatch {
            received: frame[FRAME_LEN - 1],
            computed,
        });
    }
    let value = i32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]);
    if frame[1] == sdo::RESP_ABORT {
        return Err(CodecError::DeviceAbort(AbortCode(value as u32)));
    }
    Ok(value)
}

/// Pulls response frames out of a byte stream, resynchronising on the sync byte.
///
/// Only the bytes needed for the next decision are read, so a valid frame that follows garbage
/// is never partially consumed while skipping. A frame cut short by a timeout is dropped, and
/// the hunt gives up at the deadline even while bytes keep arriving.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: VecDeque<u8>,
    discarded: u64,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes skipped while hunting for a frame since the last call.
    pub fn take_discarded(&mut self) -> u64 {
        std::mem::take(&mut self.discarded)
    }

    /// Read until a frame carrying `markers` is found or `deadline` passes.
    pub fn next_frame<R: Read + ?Sized>(
        &mut self,
        src: &mut R,
        markers: Markers,
        deadline: Instant,
    ) -> Result<[u8; FRAME_LEN]> {
        match self.scan(src, markers, deadline) {
            Err(CodecError::Timeout) => {
                if !self.buf.is_empty() {
                    tracing::warn!(bytes = self.buf.len(), "dropping incomplete frame");
                    self.discarded += self.buf.len() as u64;
                    self.buf.clear();
                }
                Err(CodecError::Timeout)
            }
            other => other,
        }
    }

    fn scan<R: Read + ?Sized>(
        &mut self,
        src: &mut R,
        markers: Markers,
        deadline: Instant,
    ) -> Result<[u8; FRAME_LEN]> {
        loop {
            self.fill(src, 1, deadline)?;
            if self.buf[0] != SYNC {
                self.skip();
                continue;
            }
            self.fill(src, HEADER_LEN, deadline)?;
            let header: [u8; HEADER_LEN] = [
                self.buf[0],
                self.buf[1],
                self.buf[2],
                self.buf[3],
                self.buf[4],
            ];
            if !markers.accepts(header[1], &header[2..]) {
                // drop only the sync byte; the header bytes may start the real frame
                self.skip();
                continue;
            }
            self.fill(src, FRAME_LEN, deadline)?;
            let mut frame = [0u8; FRAME_LEN];
            for (dst, b) in frame.iter_mut().zip(self.buf.drain(..FRAME_LEN)) {
                *dst = b;
            }
            return Ok(frame);
        }
    }

    fn skip(&mut self) {
        if let Some(b) = self.buf.pop_front() {
            tracing::trace!(byte = b, "resync: skipping byte");
            self.discarded += 1;
        }
    }

    fn fill<R: Read + ?Sized>(&mut self, src: &mut R, want: usize, deadline: Instant) -> Result<()> {
        let mut chunk = [0u8; FRAME_LEN];
        while self.buf.len() < want {
            if Instant::now() >= deadline {
                return Err(CodecError::Timeout);
            }
            let need = want - self.buf.len();
            match src.read(&mut chunk[..need]) {
                Ok(0) => return Err(CodecError::Timeout),
                Ok(n) => self.buf.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::UnexpectedEof
                    ) =>
                {
                    return Err(CodecError::Timeout)
                }
                Err(e) => return Err(CodecError::Io(e.to_string())),
            }
        }
        Ok(())
    }
}
