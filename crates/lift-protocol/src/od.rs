//! Object dictionary subset used by the lift drive.

use core::fmt;

/// One addressable drive register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Register {
    pub name: &'static str,
    pub index: u16,
    pub sub_index: u8,
    /// Payload width in bytes (1, 2 or 4).
    pub len: u8,
}

impl Register {
    pub const fn new(name: &'static str, index: u16, sub_index: u8, len: u8) -> Self {
        Self {
            name,
            index,
            sub_index,
            len,
        }
    }

    pub const fn address(&self) -> (u16, u8) {
        (self.index, self.sub_index)
    }

    /// The three multiplexer bytes as they appear on the wire.
    pub const fn mux(&self) -> [u8; 3] {
        let idx = self.index.to_le_bytes();
        [idx[0], idx[1], self.sub_index]
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X}:{:02X})", self.name, self.index, self.sub_index)
    }
}

pub const CONTROL_WORD: Register = Register::new("control_word", 0x6040, 0x00, 2);
pub const STATUS_WORD: Register = Register::new("status_word", 0x6041, 0x00, 2);
pub const OPERATION_MODE: Register = Register::new("operation_mode", 0x6060, 0x00, 1);

pub const POSITION_ACTUAL: Register = Register::new("position_actual", 0x6063, 0x00, 4);
pub const POSITION_TARGET: Register = Register::new("position_target", 0x607A, 0x00, 4);
pub const SPEED_ACTUAL: Register = Register::new("speed_actual", 0x606C, 0x00, 4);
pub const SPEED_TARGET: Register = Register::new("speed_target", 0x60FF, 0x00, 4);
/// Trapezoid (profile) speed used by position moves.
pub const PROFILE_SPEED: Register = Register::new("profile_speed", 0x6081, 0x00, 4);
pub const CURRENT_ACTUAL: Register = Register::new("current_actual", 0x6078, 0x00, 2);
pub const CURRENT_TARGET: Register = Register::new("current_target", 0x60F6, 0x08, 2);

pub const CURRENT_LIMIT: Register = Register::new("current_limit", 0x6073, 0x00, 2);
pub const SOFT_LIMIT_POSITIVE: Register = Register::new("soft_limit_positive", 0x607D, 0x01, 4);
pub const SOFT_LIMIT_NEGATIVE: Register = Register::new("soft_limit_negative", 0x607D, 0x02, 4);
pub const SPEED_LIMIT: Register = Register::new("speed_limit", 0x6080, 0x00, 4);

pub const ERROR_CODE_PRIMARY: Register = Register::new("error_code_1", 0x2601, 0x00, 2);
pub const ERROR_CODE_SECONDARY: Register = Register::new("error_code_2", 0x2602, 0x00, 2);

pub const ALL: [Register; 16] = [
    CONTROL_WORD,
    STATUS_WORD,
    OPERATION_MODE,
    POSITION_ACTUAL,
    POSITION_TARGET,
    SPEED_ACTUAL,
    SPEED_TARGET,
    PROFILE_SPEED,
    CURRENT_ACTUAL,
    CURRENT_TARGET,
    CURRENT_LIMIT,
    SOFT_LIMIT_POSITIVE,
    SOFT_LIMIT_NEGATIVE,
    SPEED_LIMIT,
    ERROR_CODE_PRIMARY,
    ERROR_CODE_SECONDARY,
];

/// Find a register by its `name`.
pub fn lookup(name: &str) -> Option<Register> {
    ALL.iter().copied().find(|r| r.name == name)
}

/// Bit patterns written to [`CONTROL_WORD`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ControlWord(pub u16);

impl ControlWord {
    pub const SHUTDOWN: Self = Self(0x06);
    pub const QUICK_STOP: Self = Self(0x0B);
    /// Shutdown command with the fault-reset bit set.
    pub const FAULT_RESET: Self = Self(0x86);
    /// Enable operation, set-points apply immediately.
    pub const ENABLE_IMMEDIATE: Self = Self(0x2F);
    /// [`Self::ENABLE_IMMEDIATE`] plus the new-set-point bit: starts an absolute move.
    pub const START_ABSOLUTE: Self = Self(0x3F);
    /// Enable operation armed for a relative move.
    pub const ENABLE_RELATIVE: Self = Self(0x4F);
    pub const START_RELATIVE: Self = Self(0x5F);

    pub fn is_fault_reset(self) -> bool {
        self.0 & 0x80 != 0
    }
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Values of [`OPERATION_MODE`] used by the lift.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum OperationMode {
    ProfilePosition = 0x01,
    ProfileVelocity = 0x03,
}

impl OperationMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::ProfilePosition),
            0x03 => Some(Self::ProfileVelocity),
            _ => None,
        }
    }
}
