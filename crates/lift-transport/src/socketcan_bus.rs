use crate::{BusInfo, CanBus, CanFilter, CanFrame, CanId, Result, Timestamp, TransportError};
use socketcan::{
    CanFrame as RawFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, SocketOptions,
    StandardId,
};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Linux SocketCAN backend (classic CAN only).
///
/// The interface must already be configured and up, e.g.
/// `ip link set can1 type can bitrate 500000 && ip link set can1 up`.
pub struct SocketCanBus {
    name: String,
    socket: CanSocket,
    timeout: Duration,
}

impl SocketCanBus {
    fn to_raw(frame: &CanFrame) -> Result<RawFrame> {
        if frame.rtr {
            return Err(TransportError::Unsupported("RTR not implemented"));
        }
        let raw = if frame.id.is_extended() {
            ExtendedId::new(frame.id.raw()).and_then(|id| RawFrame::new(id, frame.payload()))
        } else {
            StandardId::new(frame.id.raw() as u16).and_then(|id| RawFrame::new(id, frame.payload()))
        };
        raw.ok_or(TransportError::InvalidFrame("cannot build socketcan frame"))
    }

    fn from_raw(raw: &RawFrame) -> Result<CanFrame> {
        let id = if raw.is_extended() {
            CanId::extended(raw.raw_id() & 0x1FFF_FFFF)
        } else {
            CanId::standard((raw.raw_id() & 0x7FF) as u16)
        }
        .ok_or(TransportError::InvalidFrame("id range"))?;
        let mut frame = CanFrame::new(id, raw.data()).ok_or(TransportError::InvalidFrame("dlc > 8"))?;
        frame.rtr = raw.is_remote_frame();
        frame.timestamp = Some(Timestamp::now());
        Ok(frame)
    }
}

impl CanBus for SocketCanBus {
    fn open(name: &str) -> Result<Self> {
        tracing::info!(interface = %name, "opening socketcan interface");
        let socket = CanSocket::open(name).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::InterfaceNotFound(name.to_string()),
            _ => TransportError::Io(e.to_string()),
        })?;
        socket
            .set_read_timeout(DEFAULT_TIMEOUT)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            socket,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        let entries = std::fs::read_dir("/sys/class/net").map_err(|e| TransportError::Io(e.to_string()))?;
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            // ARPHRD_CAN
            let kind = std::fs::read_to_string(entry.path().join("type")).unwrap_or_default();
            if kind.trim() == "280" {
                out.push(BusInfo {
                    name,
                    driver: "socketcan".to_string(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn set_filters(&mut self, filters: &[CanFilter]) -> Result<()> {
        let raw: Vec<socketcan::CanFilter> = filters
            .iter()
            .map(|f| socketcan::CanFilter::new(f.id.raw(), f.mask))
            .collect();
        self.socket
            .set_filters(&raw)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        let wanted = timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT);
        if wanted != self.timeout {
            self.socket
                .set_read_timeout(wanted)
                .map_err(|e| TransportError::Io(e.to_string()))?;
            self.timeout = wanted;
        }
        let raw = self.socket.read_frame().map_err(|e| TransportError::from_io(&e))?;
        if let RawFrame::Error(_) = raw {
            return Err(TransportError::InvalidFrame("bus error frame"));
        }
        Self::from_raw(&raw)
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let raw = Self::to_raw(frame)?;
        tracing::trace!(interface = %self.name, %frame, "socketcan send");
        self.socket
            .write_frame(&raw)
            .map_err(|e| TransportError::from_io(&e))
    }
}
