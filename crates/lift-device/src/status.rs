use crate::PowerState;
use serde::Serialize;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Combined drive error code: secondary register in the high half, primary in the low half.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub fn combine(primary: u16, secondary: u16) -> Self {
        Self(u32::from(secondary) << 16 | u32::from(primary))
    }

    pub fn primary(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn secondary(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn is_clear(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Snapshot returned by [`crate::LiftDevice::get_status`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LiftStatus {
    pub speed_mps: f64,
    pub height_m: f64,
    pub error_code: ErrorCode,
    pub state: PowerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl LiftStatus {
    pub fn new(speed_mps: f64, height_m: f64, error_code: ErrorCode, state: PowerState) -> Self {
        Self {
            speed_mps,
            height_m,
            error_code,
            state,
            ts: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_halves() {
        let code = ErrorCode::combine(0x0004, 0x0001);
        assert_eq!(code.0, 0x0001_0004);
        assert_eq!(code.primary(), 0x0004);
        assert_eq!(code.secondary(), 0x0001);
        assert!(!code.is_clear());
        assert_eq!(code.to_string(), "0x00010004");
        assert!(ErrorCode::default().is_clear());
    }

    #[test]
    fn status_carries_timestamp() {
        let s = LiftStatus::new(0.0, 0.2, ErrorCode(0), PowerState::SwitchOnDisabled);
        let ts = s.ts.as_deref().unwrap();
        assert!(OffsetDateTime::parse(ts, &Rfc3339).is_ok(), "{ts}");
    }
}
