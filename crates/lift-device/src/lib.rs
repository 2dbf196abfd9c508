//! lift-device: drive the linear lift over CAN or RS-232
//!
//! [`CanLift`] and [`UartLift`] expose height and speed in metres through the [`LiftDevice`]
//! trait. Underneath, a [`MotorController`] sequences control words through an explicit
//! [`PowerStateMachine`] and talks to the drive through a [`RegisterChannel`].

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{
    load_config_file, load_configs_dir, CanConfig, LiftConfig, LiftRegistry, TransportConfig,
    UartConfig,
};

mod metrics;
pub use metrics::{LinkMetrics, MetricsHub};

mod channel;
pub use channel::{FramedChannel, RegisterChannel, SdoChannel};

pub mod state;
pub use state::{PowerState, PowerStateMachine};

mod controller;
pub use controller::MotorController;

mod status;
pub use status::{ErrorCode, LiftStatus};

mod device;
pub use device::{open_lift, CanLift, LiftDevice, UartLift};
