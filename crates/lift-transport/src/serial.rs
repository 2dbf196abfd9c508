use crate::{BusInfo, ByteLink, Result, TransportError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// RS-232 link to the drive: 8 data bits, no parity, 1 stop bit, no flow control.
pub struct SerialLink {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open_with(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        tracing::info!(%path, baud_rate, "opening serial link");
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::InterfaceNotFound(path.to_string()),
                _ => TransportError::Io(e.to_string()),
            })?;
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }
}

impl ByteLink for SerialLink {
    fn open(path: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with(path, baud_rate, DEFAULT_TIMEOUT)
    }

    fn list() -> Result<Vec<BusInfo>> {
        let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let driver = match p.port_type {
                    SerialPortType::UsbPort(_) => "usb-serial",
                    _ => "serial",
                };
                BusInfo {
                    name: p.port_name,
                    driver: driver.to_string(),
                }
            })
            .collect())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl io::Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl io::Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
