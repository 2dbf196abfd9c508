//! Register access over one of the two transports.

use crate::{Error, LinkMetrics, Result};
use lift_protocol::{framed, sdo, CodecError, FrameScanner, Markers, Register};
use lift_transport::{ByteLink, CanBus, CanFilter, CanFrame, CanId, TransportError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Read and write drive registers, one blocking exchange at a time.
pub trait RegisterChannel {
    /// Read a register. The value is returned as the raw little-endian payload.
    fn read(&mut self, register: Register) -> Result<u32>;

    /// Write a register using its natural length.
    fn write(&mut self, register: Register, value: u32) -> Result<()> {
        self.write_with_len(register, value, register.len)
    }

    /// Write a register with an explicit payload length (1, 2 or 4 bytes).
    fn write_with_len(&mut self, register: Register, value: u32, len: u8) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Release the underlying transport. Later calls fail with [`Error::NotConnected`].
    fn close(&mut self);
}

fn record(metrics: Option<&LinkMetrics>, outcome: &core::result::Result<(), &CodecError>) {
    let Some(m) = metrics else {
        return;
    };
    match outcome {
        Ok(()) => m.responses.inc(),
        Err(CodecError::Timeout) => m.timeouts.inc(),
        Err(CodecError::ChecksumMismatch { .. }) => m.checksum_failures.inc(),
        Err(CodecError::DeviceAbort(_)) => m.aborts.inc(),
        Err(_) => {}
    }
}

fn log_failure(register: Register, err: &CodecError) {
    match err {
        CodecError::Timeout => warn!(%register, "no response before the deadline"),
        CodecError::DeviceAbort(code) => warn!(%register, %code, "drive aborted the transfer"),
        other => warn!(%register, error = %other, "bad response"),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expedited SDO over a CAN bus: requests to `0x600 + node`, responses from `0x580 + node`.
pub struct SdoChannel<B: CanBus> {
    bus: Option<B>,
    node_id: u8,
    request_id: CanId,
    response_id: CanId,
    timeout: Duration,
    metrics: Option<LinkMetrics>,
}

impl<B: CanBus> SdoChannel<B> {
    pub fn new(bus: B, node_id: u8, timeout: Duration) -> Result<Self> {
        if !(1..=127).contains(&node_id) {
            return Err(Error::Usage(format!("node id {node_id} outside 1..=127")));
        }
        let cob = |base: u16| {
            CanId::standard(base + u16::from(node_id))
                .ok_or_else(|| Error::Usage(format!("no COB-ID for node {node_id}")))
        };
        Ok(Self {
            bus: Some(bus),
            node_id,
            request_id: cob(sdo::COB_REQUEST_BASE)?,
            response_id: cob(sdo::COB_RESPONSE_BASE)?,
            timeout,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: LinkMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn response_id(&self) -> CanId {
        self.response_id
    }

    /// Ask the bus to deliver only this node's responses. Backends without filter
    /// support are left unfiltered; responses are matched by COB-ID anyway.
    pub fn install_filter(&mut self) -> Result<()> {
        let bus = self.bus.as_mut().ok_or(Error::NotConnected)?;
        match bus.set_filters(&[CanFilter::exact(self.response_id)]) {
            Ok(()) => Ok(()),
            Err(TransportError::Unsupported(what)) => {
                debug!(what, "bus has no acceptance filters");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send one request and wait for the matching response.
    ///
    /// Frames from other nodes, or answering a different register, are skipped. An empty
    /// vector means the deadline passed.
    fn exchange(&mut self, request: [u8; sdo::FRAME_LEN], register: Register) -> Result<Vec<u8>> {
        let bus = self.bus.as_mut().ok_or(Error::NotConnected)?;
        let frame = CanFrame::new(self.request_id, &request)
            .ok_or_else(|| Error::Usage("SDO request longer than 8 bytes".into()))?;
        debug!(%frame, "sdo request");
        bus.send(&frame)?;
        if let Some(m) = &self.metrics {
            m.requests.inc();
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let wait_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX).max(1);
            match bus.recv(Some(wait_ms)) {
                Ok(rx) if rx.id != self.response_id => {
                    trace!(frame = %rx, "skipping frame from another node");
                }
                Ok(rx) if sdo::response_mux(rx.payload()) != Some(register.address()) => {
                    trace!(frame = %rx, %register, "skipping response for another register");
                }
                Ok(rx) => {
                    debug!(frame = %rx, "sdo response");
                    return Ok(rx.payload().to_vec());
                }
                Err(TransportError::Timeout) => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<B: CanBus> RegisterChannel for SdoChannel<B> {
    fn read(&mut self, register: Register) -> Result<u32> {
        let data = self.exchange(sdo::encode_read(register), register)?;
        let decoded = sdo::decode_response(&data);
        record(self.metrics.as_ref(), &decoded.as_ref().map(|_| ()));
        decoded.map_err(|e| {
            log_failure(register, &e);
            Error::from(e)
        })
    }

    fn write_with_len(&mut self, register: Register, value: u32, len: u8) -> Result<()> {
        let request = sdo::encode_write(register, value, len)?;
        let data = self.exchange(request, register)?;
        let acked = sdo::decode_write_ack(&data);
        record(self.metrics.as_ref(), &acked.as_ref().copied());
        acked.map_err(|e| {
            log_failure(register, &e);
            Error::from(e)
        })
    }

    fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    fn close(&mut self) {
        if self.bus.take().is_some() {
            debug!(node = self.node_id, "sdo channel closed");
        }
    }
}

/// Checksummed 10-byte frames over a serial link.
///
/// Writes are not acknowledged: the drive's write echoes are left in the stream and skipped by
/// the scanner on the next read.
pub struct FramedChannel<L: ByteLink> {
    link: Option<L>,
    scanner: FrameScanner,
    timeout: Duration,
    metrics: Option<LinkMetrics>,
}

impl<L: ByteLink> FramedChannel<L> {
    pub fn new(mut link: L, timeout: Duration) -> Result<Self> {
        link.set_timeout(timeout)?;
        Ok(Self {
            link: Some(link),
            scanner: FrameScanner::new(),
            timeout,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: LinkMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn send(&mut self, frame: &[u8; framed::FRAME_LEN]) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        debug!(link = link.name(), bytes = %hex(frame), "serial request");
        link.write_all(frame)
            .and_then(|()| link.flush())
            .map_err(|e| Error::from(TransportError::from_io(&e)))?;
        if let Some(m) = &self.metrics {
            m.requests.inc();
        }
        Ok(())
    }
}

impl<L: ByteLink> RegisterChannel for FramedChannel<L> {
    fn read(&mut self, register: Register) -> Result<u32> {
        self.send(&framed::encode_read(register))?;
        let deadline = Instant::now() + self.timeout;
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let markers = Markers::for_read(register);
        let decoded = self
            .scanner
            .next_frame(link, markers, deadline)
            .and_then(|frame| {
                debug!(bytes = %hex(&frame), "serial response");
                framed::decode_frame(&frame, markers)
            });

        let skipped = self.scanner.take_discarded();
        if skipped > 0 {
            warn!(%register, skipped, "resynchronised serial stream");
        }
        if let Some(m) = &self.metrics {
            m.resync_bytes.inc_by(skipped);
        }
        record(self.metrics.as_ref(), &decoded.as_ref().map(|_| ()));
        match decoded {
            Ok(v) => Ok(v as u32),
            Err(e) => {
                log_failure(register, &e);
                Err(e.into())
            }
        }
    }

    fn write_with_len(&mut self, register: Register, value: u32, len: u8) -> Result<()> {
        let frame = framed::encode_write(register, value, len)?;
        self.send(&frame)
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            debug!(link = link.name(), "serial channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lift_protocol::od;
    use lift_transport::{BusInfo, MockBus, MockLink};
    use std::io;

    /// A line that never goes quiet: every read yields one noise byte.
    struct Chatter;

    impl io::Read for Chatter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(1));
            match buf.first_mut() {
                Some(b) => {
                    *b = 0x00;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }

    impl io::Write for Chatter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteLink for Chatter {
        fn open(_path: &str, _baud_rate: u32) -> lift_transport::Result<Self> {
            Ok(Self)
        }

        fn list() -> lift_transport::Result<Vec<BusInfo>> {
            Ok(Vec::new())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> lift_transport::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "chatter"
        }
    }

    fn reply(id: u16, data: &[u8]) -> CanFrame {
        CanFrame::new(CanId::standard(id).unwrap(), data).unwrap()
    }

    #[test]
    fn sdo_read_skips_foreign_frames() {
        let bus = MockBus::open("mock0").unwrap();
        let h = bus.handle();
        let mut ch = SdoChannel::new(bus, 1, Duration::from_millis(20)).unwrap();
        h.push_rx(reply(0x582, &[0x43, 0x63, 0x60, 0x00, 1, 0, 0, 0]));
        h.push_rx(reply(0x581, &[0x43, 0x6C, 0x60, 0x00, 2, 0, 0, 0]));
        h.push_rx(reply(0x581, &[0x43, 0x63, 0x60, 0x00, 0x00, 0xC0, 0x45, 0x00]));
        assert_eq!(ch.read(od::POSITION_ACTUAL).unwrap(), 4_571_136);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id.raw(), 0x601);
        assert_eq!(sent[0].payload(), &[0x40, 0x63, 0x60, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn sdo_silence_is_a_timeout() {
        let bus = MockBus::open("mock0").unwrap();
        let metrics = LinkMetrics::new().unwrap();
        let mut ch = SdoChannel::new(bus, 1, Duration::from_millis(5))
            .unwrap()
            .with_metrics(metrics.clone());
        let err = ch.read(od::STATUS_WORD).unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert_eq!(metrics.requests.get(), 1);
        assert_eq!(metrics.timeouts.get(), 1);
    }

    #[test]
    fn sdo_bad_length_sends_nothing() {
        let bus = MockBus::open("mock0").unwrap();
        let h = bus.handle();
        let mut ch = SdoChannel::new(bus, 1, Duration::from_millis(5)).unwrap();
        let err = ch.write_with_len(od::CONTROL_WORD, 0x2F, 3).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::Usage(_))), "{err}");
        assert!(h.sent().is_empty());
    }

    #[test]
    fn sdo_node_id_range() {
        assert!(SdoChannel::new(MockBus::open("m").unwrap(), 0, Duration::ZERO).is_err());
        assert!(SdoChannel::new(MockBus::open("m").unwrap(), 128, Duration::ZERO).is_err());
        let ch = SdoChannel::new(MockBus::open("m").unwrap(), 127, Duration::ZERO).unwrap();
        assert_eq!(ch.response_id().raw(), 0x5FF);
    }

    #[test]
    fn closed_channel_refuses_io() {
        let mut ch = SdoChannel::new(MockBus::open("m").unwrap(), 1, Duration::ZERO).unwrap();
        ch.close();
        assert!(!ch.is_open());
        assert!(matches!(ch.read(od::STATUS_WORD), Err(Error::NotConnected)));

        let mut ch = FramedChannel::new(MockLink::open("tty", 38_400).unwrap(), Duration::ZERO)
            .unwrap();
        ch.close();
        assert!(matches!(ch.write(od::CONTROL_WORD, 0x06), Err(Error::NotConnected)));
    }

    #[test]
    fn framed_write_is_fire_and_forget() {
        let link = MockLink::open("tty", 38_400).unwrap();
        let h = link.handle();
        let mut ch = FramedChannel::new(link, Duration::from_millis(5)).unwrap();
        ch.write(od::OPERATION_MODE, 1).unwrap();
        assert_eq!(
            h.written(),
            vec![0x7F, 0x2F, 0x60, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x91]
        );
    }

    #[test]
    fn framed_read_skips_write_echo() {
        let link = MockLink::open("tty", 38_400).unwrap();
        let h = link.handle();
        let metrics = LinkMetrics::new().unwrap();
        let mut ch = FramedChannel::new(link, Duration::from_millis(5))
            .unwrap()
            .with_metrics(metrics.clone());
        // echo of an earlier write, then the position answer
        h.push_rx(&framed::wrap([0x60, 0x40, 0x60, 0x00, 0, 0, 0, 0]));
        h.push_rx(&framed::wrap([0x43, 0x63, 0x60, 0x00, 0x00, 0xB0, 0x36, 0x00]));
        assert_eq!(ch.read(od::POSITION_ACTUAL).unwrap(), 3_584_000);
        assert_eq!(metrics.resync_bytes.get(), 10);
        assert_eq!(metrics.responses.get(), 1);
    }

    #[test]
    fn framed_read_ignores_other_sub_index() {
        let link = MockLink::open("tty", 38_400).unwrap();
        let h = link.handle();
        let mut ch = FramedChannel::new(link, Duration::from_millis(5)).unwrap();
        let limit = |sub: u8, value: i32| {
            let v = value.to_le_bytes();
            framed::wrap([0x43, 0x7D, 0x60, sub, v[0], v[1], v[2], v[3]])
        };

        h.push_rx(&limit(0x02, -100));
        let err = ch.read(od::SOFT_LIMIT_POSITIVE).unwrap_err();
        assert!(err.is_timeout(), "{err}");

        h.push_rx(&limit(0x02, -100));
        h.push_rx(&limit(0x01, 3_584_000));
        assert_eq!(ch.read(od::SOFT_LIMIT_POSITIVE).unwrap(), 3_584_000);
    }

    #[test]
    fn framed_read_is_bounded_on_a_noisy_line() {
        let metrics = LinkMetrics::new().unwrap();
        let mut ch = FramedChannel::new(Chatter, Duration::from_millis(50))
            .unwrap()
            .with_metrics(metrics.clone());
        let start = Instant::now();
        let err = ch.read(od::POSITION_ACTUAL).unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
        assert_eq!(metrics.timeouts.get(), 1);
        assert!(metrics.resync_bytes.get() > 0);
    }
}
