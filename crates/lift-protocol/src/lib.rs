//! lift-protocol: wire codecs for the lift actuator drive
//!
//! The drive speaks a CANopen-like SDO scheme. On CAN each request/response is one 8-byte
//! frame ([`sdo`]); on RS-232 the same 8 bytes are wrapped in a 10-byte frame with a sync byte
//! and an LRC checksum ([`framed`]). Registers live in [`od`] and physical-unit conversions in
//! [`units`]. Nothing here performs I/O except the serial frame scanner, which pulls bytes from
//! any `std::io::Read`.

mod error;
pub use error::{AbortCode, CodecError, Result};

pub mod od;
pub use od::{ControlWord, OperationMode, Register};

pub mod sdo;

pub mod framed;
pub use framed::{FrameScanner, Markers};

pub mod units;
pub use units::Calibration;
