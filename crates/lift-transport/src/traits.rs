use crate::{BusInfo, CanFilter, CanFrame, Result, TransportError};
use std::io::{Read, Write};
use std::time::Duration;

/// A minimal blocking CAN bus interface.
pub trait CanBus {
    /// Open a CAN interface by name (e.g., "can0", "can1").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available interfaces for this backend.
    fn list() -> Result<Vec<BusInfo>>;

    /// Set acceptance filters if supported.
    fn set_filters(&mut self, _filters: &[CanFilter]) -> Result<()> {
        let _ = _filters;
        Err(TransportError::Unsupported("filters not supported"))
    }

    /// Receive one frame (blocking with optional timeout in milliseconds).
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame>;

    /// Send one frame.
    fn send(&mut self, frame: &CanFrame) -> Result<()>;
}

/// A blocking, unframed byte stream (RS-232 style).
///
/// Reads honour the timeout set with [`ByteLink::set_timeout`]; an expired read surfaces as an
/// `std::io::ErrorKind::TimedOut` error, never as a short successful read.
pub trait ByteLink: Read + Write {
    /// Open a serial device at the given baud rate (8 data bits, no parity, 1 stop bit).
    fn open(path: &str, baud_rate: u32) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available devices for this backend.
    fn list() -> Result<Vec<BusInfo>>;

    /// Set the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Device path or name the link was opened with.
    fn name(&self) -> &str;
}
