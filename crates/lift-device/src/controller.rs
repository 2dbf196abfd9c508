use crate::{Error, ErrorCode, PowerState, PowerStateMachine, RegisterChannel, Result};
use lift_protocol::units::{device_speed_to_rpm, rpm_to_device_speed};
use lift_protocol::{od, Calibration, CodecError, ControlWord, OperationMode};
use tracing::debug;

/// Drives one actuator through a [`RegisterChannel`].
///
/// Control words are checked against the local [`PowerStateMachine`] before they are sent, so a
/// word the drive would ignore fails with [`Error::InvalidTransition`] and nothing goes on the
/// wire. Positions are in encoder increments and speeds in rpm unless a method says otherwise;
/// the `_mm` helpers use the lift's [`Calibration`].
pub struct MotorController<C: RegisterChannel> {
    channel: C,
    machine: PowerStateMachine,
    calibration: Calibration,
}

impl<C: RegisterChannel> MotorController<C> {
    pub fn new(channel: C, calibration: Calibration) -> Self {
        Self {
            channel,
            machine: PowerStateMachine::new(),
            calibration,
        }
    }

    pub fn state(&self) -> PowerState {
        self.machine.state()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn read_status_word(&mut self) -> Result<u16> {
        Ok(self.channel.read(od::STATUS_WORD)? as u16)
    }

    /// Read the status word and adopt the state it reports.
    pub fn refresh_state(&mut self) -> Result<PowerState> {
        let status = self.read_status_word()?;
        Ok(self.machine.observe(status))
    }

    /// Validate, send, then record a control word.
    pub fn set_control_word(&mut self, word: ControlWord) -> Result<PowerState> {
        if !self.channel.is_open() {
            return Err(Error::NotConnected);
        }
        self.machine.check(word)?;
        debug!(%word, state = %self.machine.state(), "control word");
        self.channel.write(od::CONTROL_WORD, u32::from(word.0))?;
        self.machine.advance(word)
    }

    pub fn reset_error(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::FAULT_RESET)
    }

    pub fn quick_stop(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::QUICK_STOP)
    }

    pub fn shutdown(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::SHUTDOWN)
    }

    /// Enable operation, select profile position mode, start the absolute move.
    pub fn start_move(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::ENABLE_IMMEDIATE)?;
        self.set_operation_mode(OperationMode::ProfilePosition)?;
        self.set_control_word(ControlWord::START_ABSOLUTE)
    }

    /// Start a move by the target position relative to the current one.
    pub fn start_relative_move(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::ENABLE_RELATIVE)?;
        self.set_control_word(ControlWord::START_RELATIVE)
    }

    /// Make freshly written targets take effect.
    pub fn latch_targets(&mut self) -> Result<PowerState> {
        self.set_control_word(ControlWord::ENABLE_IMMEDIATE)?;
        self.set_control_word(ControlWord::START_ABSOLUTE)
    }

    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        self.channel.write(od::OPERATION_MODE, mode as u32)
    }

    pub fn operation_mode(&mut self) -> Result<OperationMode> {
        let raw = self.channel.read(od::OPERATION_MODE)? as u8;
        OperationMode::from_raw(raw).ok_or_else(|| {
            Error::Codec(CodecError::MalformedResponse(format!(
                "unknown operation mode 0x{raw:02X}"
            )))
        })
    }

    pub fn set_target_position(&mut self, increments: i32) -> Result<()> {
        self.channel.write(od::POSITION_TARGET, increments as u32)
    }

    /// Profile (trapezoid) speed used by position moves.
    pub fn set_trapezoid_speed(&mut self, rpm: f64) -> Result<()> {
        self.channel
            .write(od::PROFILE_SPEED, rpm_to_device_speed(rpm) as u32)
    }

    /// Target speed for profile velocity mode.
    pub fn set_target_speed(&mut self, rpm: f64) -> Result<()> {
        self.channel
            .write(od::SPEED_TARGET, rpm_to_device_speed(rpm) as u32)
    }

    /// Absolute move to `position_mm` at `speed_mm_s`: `0x2F`, position, speed, `0x3F`.
    pub fn set_pos_speed(&mut self, position_mm: f64, speed_mm_s: f64) -> Result<()> {
        if !(0.0..=self.calibration.travel_mm).contains(&position_mm) {
            return Err(Error::Usage(format!(
                "position {position_mm} mm outside 0..={} mm",
                self.calibration.travel_mm
            )));
        }
        if !speed_mm_s.is_finite() || speed_mm_s < 0.0 {
            return Err(Error::Usage(format!("invalid speed {speed_mm_s} mm/s")));
        }
        self.set_control_word(ControlWord::ENABLE_IMMEDIATE)?;
        self.set_target_position(self.calibration.mm_to_increments(position_mm))?;
        self.set_trapezoid_speed(self.calibration.mm_s_to_rpm(speed_mm_s))?;
        self.set_control_word(ControlWord::START_ABSOLUTE)?;
        Ok(())
    }

    /// Actual position in increments.
    pub fn get_now_position(&mut self) -> Result<i32> {
        Ok(self.channel.read(od::POSITION_ACTUAL)? as i32)
    }

    /// Actual motor speed in rpm.
    pub fn get_now_speed(&mut self) -> Result<f64> {
        let raw = self.channel.read(od::SPEED_ACTUAL)? as i32;
        Ok(device_speed_to_rpm(raw))
    }

    pub fn get_position_mm(&mut self) -> Result<f64> {
        let inc = self.get_now_position()?;
        Ok(self.calibration.increments_to_mm(inc))
    }

    pub fn get_speed_mm_s(&mut self) -> Result<f64> {
        let rpm = self.get_now_speed()?;
        Ok(self.calibration.rpm_to_mm_s(rpm))
    }

    /// Both error registers; zero means no fault.
    pub fn get_err_code(&mut self) -> Result<ErrorCode> {
        let primary = self.channel.read(od::ERROR_CODE_PRIMARY)? as u16;
        let secondary = self.channel.read(od::ERROR_CODE_SECONDARY)? as u16;
        let code = ErrorCode::combine(primary, secondary);
        debug!(%code, "error registers");
        Ok(code)
    }

    /// Actual motor current in drive units.
    pub fn get_current(&mut self) -> Result<i16> {
        Ok(self.channel.read(od::CURRENT_ACTUAL)? as u16 as i16)
    }

    pub fn set_target_current(&mut self, current: i16) -> Result<()> {
        self.channel
            .write(od::CURRENT_TARGET, u32::from(current as u16))
    }

    pub fn current_limit(&mut self) -> Result<u16> {
        Ok(self.channel.read(od::CURRENT_LIMIT)? as u16)
    }

    pub fn set_current_limit(&mut self, limit: u16) -> Result<()> {
        self.channel.write(od::CURRENT_LIMIT, u32::from(limit))
    }

    /// Software position limits `(negative, positive)` in increments.
    pub fn soft_limits(&mut self) -> Result<(i32, i32)> {
        let negative = self.channel.read(od::SOFT_LIMIT_NEGATIVE)? as i32;
        let positive = self.channel.read(od::SOFT_LIMIT_POSITIVE)? as i32;
        Ok((negative, positive))
    }

    pub fn set_soft_limits(&mut self, negative: i32, positive: i32) -> Result<()> {
        if negative > positive {
            return Err(Error::Usage(format!(
                "negative limit {negative} above positive limit {positive}"
            )));
        }
        self.channel.write(od::SOFT_LIMIT_NEGATIVE, negative as u32)?;
        self.channel.write(od::SOFT_LIMIT_POSITIVE, positive as u32)
    }

    /// Maximum profile speed in rpm.
    pub fn speed_limit(&mut self) -> Result<f64> {
        let raw = self.channel.read(od::SPEED_LIMIT)? as i32;
        Ok(device_speed_to_rpm(raw))
    }

    pub fn set_speed_limit(&mut self, rpm: f64) -> Result<()> {
        if !rpm.is_finite() || rpm < 0.0 {
            return Err(Error::Usage(format!("invalid speed limit {rpm} rpm")));
        }
        self.channel
            .write(od::SPEED_LIMIT, rpm_to_device_speed(rpm) as u32)
    }
}
