use crate::{
    CanConfig, Error, ErrorCode, FramedChannel, LiftConfig, LiftStatus, MotorController,
    PowerState, Result, SdoChannel, TransportConfig, UartConfig,
};
use lift_protocol::units::{CAN_LIFT, UART_LIFT};
use lift_protocol::{Calibration, OperationMode};
use lift_transport::{ByteLink, CanBus};
use tracing::info;

/// Height and speed of a lift column in metres and metres per second.
pub trait LiftDevice {
    /// Start moving towards the programmed target.
    fn go(&mut self) -> Result<()>;

    /// Quick stop.
    fn stop(&mut self) -> Result<()>;

    fn set_height(&mut self, metres: f64) -> Result<()>;

    fn get_height(&mut self) -> Result<f64>;

    fn set_speed(&mut self, metres_per_second: f64) -> Result<()>;

    fn get_speed(&mut self) -> Result<f64>;

    fn error_code(&mut self) -> Result<ErrorCode>;

    /// Last known power state of the drive.
    fn power_state(&self) -> PowerState;

    fn get_status(&mut self) -> Result<LiftStatus> {
        let speed = self.get_speed()?;
        let height = self.get_height()?;
        let code = self.error_code()?;
        info!(speed_mps = speed, height_m = height, error_code = %code, "lift status");
        Ok(LiftStatus::new(speed, height, code, self.power_state()))
    }

    /// Release the transport. Every later call fails with [`Error::NotConnected`].
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

fn check_height(calibration: &Calibration, metres: f64) -> Result<()> {
    let max = calibration.travel_metres();
    if (0.0..=max).contains(&metres) {
        Ok(())
    } else {
        Err(Error::Usage(format!("height {metres} m outside 0..={max} m")))
    }
}

fn check_speed(metres_per_second: f64) -> Result<()> {
    if metres_per_second.is_finite() && metres_per_second >= 0.0 {
        Ok(())
    } else {
        Err(Error::Usage(format!("invalid speed {metres_per_second} m/s")))
    }
}

/// Lift driven over CANopen SDO.
pub struct CanLift<B: CanBus> {
    motor: MotorController<SdoChannel<B>>,
}

impl<B: CanBus> CanLift<B> {
    /// Open the configured interface and bring the drive out of any fault.
    pub fn open(config: &CanConfig) -> Result<Self> {
        config.validate()?;
        let bus = B::open(&config.channel)?;
        info!(channel = %config.channel, node = config.node_id, bitrate = config.bitrate, "opening CAN lift");
        Self::with_bus(bus, config)
    }

    /// Use an already open bus.
    pub fn with_bus(bus: B, config: &CanConfig) -> Result<Self> {
        config.validate()?;
        let mut channel = SdoChannel::new(bus, config.node_id, config.timeout())?;
        channel.install_filter()?;
        Self::from_channel(channel)
    }

    /// Wrap a prepared channel (e.g. one carrying metrics) and initialise the drive.
    pub fn from_channel(channel: SdoChannel<B>) -> Result<Self> {
        let mut lift = Self {
            motor: MotorController::new(channel, CAN_LIFT),
        };
        lift.init()?;
        Ok(lift)
    }

    fn init(&mut self) -> Result<()> {
        self.motor.refresh_state()?;
        self.motor.reset_error()?;
        info!(state = %self.motor.state(), "CAN lift ready");
        Ok(())
    }

    /// Millimetre-level access to the drive.
    pub fn motor(&mut self) -> &mut MotorController<SdoChannel<B>> {
        &mut self.motor
    }
}

impl<B: CanBus> LiftDevice for CanLift<B> {
    fn go(&mut self) -> Result<()> {
        self.motor.start_move().map(drop)
    }

    fn stop(&mut self) -> Result<()> {
        self.motor.quick_stop().map(drop)
    }

    /// Programs the target only; [`LiftDevice::go`] starts the move.
    fn set_height(&mut self, metres: f64) -> Result<()> {
        check_height(&CAN_LIFT, metres)?;
        self.motor
            .set_target_position(CAN_LIFT.metres_to_increments(metres))
    }

    fn get_height(&mut self) -> Result<f64> {
        let inc = self.motor.get_now_position()?;
        Ok(CAN_LIFT.increments_to_metres(inc))
    }

    fn set_speed(&mut self, metres_per_second: f64) -> Result<()> {
        check_speed(metres_per_second)?;
        self.motor
            .set_trapezoid_speed(CAN_LIFT.m_s_to_rpm(metres_per_second))
    }

    fn get_speed(&mut self) -> Result<f64> {
        let rpm = self.motor.get_now_speed()?;
        Ok(CAN_LIFT.rpm_to_m_s(rpm))
    }

    fn error_code(&mut self) -> Result<ErrorCode> {
        self.motor.get_err_code()
    }

    fn power_state(&self) -> PowerState {
        self.motor.state()
    }

    fn close(&mut self) {
        if self.motor.is_open() {
            self.motor.close();
            info!("CAN lift closed");
        }
    }

    fn is_open(&self) -> bool {
        self.motor.is_open()
    }
}

/// Lift driven over the RS-232 framed protocol.
pub struct UartLift<L: ByteLink> {
    motor: MotorController<FramedChannel<L>>,
}

impl<L: ByteLink> UartLift<L> {
    pub fn open(config: &UartConfig) -> Result<Self> {
        config.validate()?;
        let link = L::open(&config.device, config.baudrate)?;
        info!(device = %config.device, baudrate = config.baudrate, "opening RS-232 lift");
        Self::with_link(link, config)
    }

    pub fn with_link(link: L, config: &UartConfig) -> Result<Self> {
        config.validate()?;
        let channel = FramedChannel::new(link, config.timeout())?;
        Self::from_channel(channel, config.initial_speed_rpm)
    }

    /// Wrap a prepared channel, then select position mode at `initial_speed_rpm`.
    pub fn from_channel(channel: FramedChannel<L>, initial_speed_rpm: f64) -> Result<Self> {
        let mut lift = Self {
            motor: MotorController::new(channel, UART_LIFT),
        };
        lift.init(initial_speed_rpm)?;
        Ok(lift)
    }

    fn init(&mut self, initial_speed_rpm: f64) -> Result<()> {
        self.motor.refresh_state()?;
        self.motor.reset_error()?;
        self.motor.set_operation_mode(OperationMode::ProfilePosition)?;
        self.motor.set_trapezoid_speed(initial_speed_rpm)?;
        info!(state = %self.motor.state(), "RS-232 lift ready");
        Ok(())
    }

    pub fn motor(&mut self) -> &mut MotorController<FramedChannel<L>> {
        &mut self.motor
    }

    /// Height split evenly over the two columns of the frame.
    pub fn get_column_heights(&mut self) -> Result<[f64; 2]> {
        let h = self.get_height()?;
        Ok([h / 2.0, h / 2.0])
    }

    /// Move up (positive) or down (negative) relative to the current height.
    pub fn move_by(&mut self, delta_metres: f64) -> Result<()> {
        let max = UART_LIFT.travel_metres();
        if !delta_metres.is_finite() || delta_metres.abs() > max {
            return Err(Error::Usage(format!(
                "relative move {delta_metres} m exceeds the {max} m stroke"
            )));
        }
        self.motor
            .set_target_position(UART_LIFT.metres_to_increments(delta_metres))?;
        self.motor.start_relative_move().map(drop)
    }
}

impl<L: ByteLink> LiftDevice for UartLift<L> {
    fn go(&mut self) -> Result<()> {
        self.motor.start_move().map(drop)
    }

    fn stop(&mut self) -> Result<()> {
        self.motor.quick_stop().map(drop)
    }

    /// Programs the target and starts the move.
    fn set_height(&mut self, metres: f64) -> Result<()> {
        check_height(&UART_LIFT, metres)?;
        self.motor
            .set_target_position(UART_LIFT.metres_to_increments(metres))?;
        self.motor.latch_targets().map(drop)
    }

    fn get_height(&mut self) -> Result<f64> {
        let inc = self.motor.get_now_position()?;
        Ok(UART_LIFT.increments_to_metres(inc))
    }

    fn set_speed(&mut self, metres_per_second: f64) -> Result<()> {
        check_speed(metres_per_second)?;
        self.motor
            .set_trapezoid_speed(UART_LIFT.m_s_to_rpm(metres_per_second))
    }

    fn get_speed(&mut self) -> Result<f64> {
        let rpm = self.motor.get_now_speed()?;
        Ok(UART_LIFT.rpm_to_m_s(rpm))
    }

    fn error_code(&mut self) -> Result<ErrorCode> {
        self.motor.get_err_code()
    }

    fn power_state(&self) -> PowerState {
        self.motor.state()
    }

    fn close(&mut self) {
        if self.motor.is_open() {
            self.motor.close();
            info!("RS-232 lift closed");
        }
    }

    fn is_open(&self) -> bool {
        self.motor.is_open()
    }
}

/// Open the lift described by `config` on the hardware backend compiled in.
pub fn open_lift(config: &LiftConfig) -> Result<Box<dyn LiftDevice>> {
    config.validate()?;
    info!(id = %config.id, "opening lift");
    match &config.transport {
        TransportConfig::Can(c) => open_can(c),
        TransportConfig::Uart(u) => open_uart(u),
    }
}

#[cfg(all(feature = "socketcan", target_os = "linux"))]
fn open_can(config: &CanConfig) -> Result<Box<dyn LiftDevice>> {
    Ok(Box::new(CanLift::<lift_transport::SocketCanBus>::open(config)?))
}

#[cfg(not(all(feature = "socketcan", target_os = "linux")))]
fn open_can(config: &CanConfig) -> Result<Box<dyn LiftDevice>> {
    Err(Error::Config(format!(
        "CAN channel {}: built without SocketCAN support (enable the `socketcan` feature)",
        config.channel
    )))
}

#[cfg(feature = "serial")]
fn open_uart(config: &UartConfig) -> Result<Box<dyn LiftDevice>> {
    Ok(Box::new(UartLift::<lift_transport::SerialLink>::open(config)?))
}

#[cfg(not(feature = "serial"))]
fn open_uart(config: &UartConfig) -> Result<Box<dyn LiftDevice>> {
    Err(Error::Config(format!(
        "serial device {}: built without serial support (enable the `serial` feature)",
        config.device
    )))
}
