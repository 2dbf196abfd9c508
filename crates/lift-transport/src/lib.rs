//! lift-transport: half-duplex links to the lift actuator
//!
//! Two kinds of channel are exposed: a classic CAN bus ([`CanBus`]) exchanging 8-byte frames,
//! and a raw byte link ([`ByteLink`]) for the RS-232 variant of the drive, where framing is done
//! by the caller. Backends are feature-gated. The default build enables the `mock` backends so
//! that the protocol layers above can be exercised on any host without hardware.

mod types;
pub use types::{BusInfo, CanFilter, CanFrame, CanId, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{ByteLink, CanBus};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockBusHandle, MockLink, MockLinkHandle};

#[cfg(all(feature = "socketcan", target_os = "linux"))]
mod socketcan_bus;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub use socketcan_bus::SocketCanBus;

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialLink;
