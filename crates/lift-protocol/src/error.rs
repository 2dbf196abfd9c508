use core::fmt;
use thiserror::Error;

pub type Result<T, E = CodecError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("no response before the deadline")]
    Timeout,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("checksum mismatch: frame carries 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },
    #[error("device abort {0}")]
    DeviceAbort(AbortCode),
    #[error("usage error: {0}")]
    Usage(String),
    #[error("link I/O error: {0}")]
    Io(String),
}

/// 32-bit SDO abort code reported by the drive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct AbortCode(pub u32);

impl AbortCode {
    pub fn code(self) -> u32 {
        self.0
    }

    /// Human-readable meaning of the standard CANopen abort codes.
    pub fn description(self) -> &'static str {
        match self.0 {
            0x0503_0000 => "toggle bit not alternated",
            0x0504_0000 => "SDO protocol timed out",
            0x0504_0001 => "command specifier not valid or unknown",
            0x0504_0005 => "out of memory",
            0x0601_0000 => "unsupported access to an object",
            0x0601_0001 => "attempt to read a write-only object",
            0x0601_0002 => "attempt to write a read-only object",
            0x0602_0000 => "object does not exist in the object dictionary",
            0x0604_0041 => "object cannot be mapped to the PDO",
            0x0604_0043 => "general parameter incompatibility",
            0x0604_0047 => "general internal incompatibility in the device",
            0x0606_0000 => "access failed due to a hardware error",
            0x0607_0010 => "data type does not match, length of service parameter does not match",
            0x0607_0012 => "data type does not match, length too high",
            0x0607_0013 => "data type does not match, length too low",
            0x0609_0011 => "sub-index does not exist",
            0x0609_0030 => "invalid value for parameter",
            0x0609_0031 => "value of parameter written too high",
            0x0609_0032 => "value of parameter written too low",
            0x0609_0036 => "maximum value is less than minimum value",
            0x0800_0000 => "general error",
            0x0800_0020 => "data cannot be transferred or stored",
            0x0800_0021 => "data cannot be transferred because of local control",
            0x0800_0022 => "data cannot be transferred in the present device state",
            0x0800_0023 => "object dictionary not present",
            0x0800_0024 => "no data available",
            _ => "unknown abort code",
        }
    }
}

impl fmt::Display for AbortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.0, self.description())
    }
}
