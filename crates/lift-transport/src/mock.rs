use crate::{BusInfo, ByteLink, CanBus, CanFilter, CanFrame, Result, Timestamp, TransportError};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type FrameResponder = Box<dyn FnMut(&CanFrame) -> Option<CanFrame> + Send>;
type ByteResponder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the recorded traffic from the others
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct BusState {
    sent: Vec<CanFrame>,
    rx: VecDeque<CanFrame>,
    filters: Vec<CanFilter>,
    responder: Option<FrameResponder>,
}

/// An in-process mock bus.
///
/// Every sent frame is recorded. Frames are received from a queue that tests fill directly
/// through a [`MockBusHandle`], or that an installed responder fills in reaction to each sent
/// frame. An empty queue yields [`TransportError::Timeout`] immediately.
pub struct MockBus {
    name: String,
    state: Arc<Mutex<BusState>>,
}

/// Shared view of a [`MockBus`] that stays usable after the bus is moved into a device.
#[derive(Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn handle(&self) -> MockBusHandle {
        MockBusHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Install a closure that answers each sent frame (or stays silent by returning `None`).
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: FnMut(&CanFrame) -> Option<CanFrame> + Send + 'static,
    {
        lock(&self.state).responder = Some(Box::new(responder));
        self
    }
}

impl MockBusHandle {
    /// Queue a frame to be returned by the next `recv`.
    pub fn push_rx(&self, frame: CanFrame) {
        lock(&self.state).rx.push_back(frame);
    }

    /// All frames sent so far.
    pub fn sent(&self) -> Vec<CanFrame> {
        lock(&self.state).sent.clone()
    }

    /// Drain the record of sent frames.
    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn filters(&self) -> Vec<CanFilter> {
        lock(&self.state).filters.clone()
    }
}

impl CanBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(BusState::default())),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn set_filters(&mut self, filters: &[CanFilter]) -> Result<()> {
        lock(&self.state).filters = filters.to_vec();
        Ok(())
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame> {
        let mut state = lock(&self.state);
        loop {
            let mut frame = state.rx.pop_front().ok_or(TransportError::Timeout)?;
            if !state.filters.is_empty() && !state.filters.iter().any(|f| f.matches(frame.id)) {
                continue;
            }
            frame.timestamp = Some(Timestamp::now());
            return Ok(frame);
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let mut state = lock(&self.state);
        tracing::trace!(bus = %self.name, %frame, "mock send");
        state.sent.push(frame.clone());
        if let Some(responder) = state.responder.as_mut() {
            if let Some(reply) = responder(frame) {
                state.rx.push_back(reply);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct LinkState {
    written: Vec<u8>,
    rx: VecDeque<u8>,
    responder: Option<ByteResponder>,
}

/// An in-process mock serial link, the byte-stream counterpart of [`MockBus`].
pub struct MockLink {
    name: String,
    state: Arc<Mutex<LinkState>>,
}

/// Shared view of a [`MockLink`].
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Install a closure that answers each `write` call with the bytes it returns.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        lock(&self.state).responder = Some(Box::new(responder));
        self
    }
}

impl MockLinkHandle {
    /// Append bytes to the receive side of the link.
    pub fn push_rx(&self, bytes: &[u8]) {
        lock(&self.state).rx.extend(bytes.iter().copied());
    }

    /// Everything written so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).written)
    }

    /// Bytes still waiting to be read.
    pub fn pending_rx(&self) -> usize {
        lock(&self.state).rx.len()
    }
}

impl io::Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = lock(&self.state);
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock link: no data"));
        }
        let n = buf.len().min(state.rx.len());
        for (dst, b) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *dst = b;
        }
        Ok(n)
    }
}

impl io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.written.extend_from_slice(buf);
        if let Some(responder) = state.responder.as_mut() {
            let reply = responder(buf);
            state.rx.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteLink for MockLink {
    fn open(path: &str, _baud_rate: u32) -> Result<Self> {
        Ok(Self {
            name: path.to_string(),
            state: Arc::new(Mutex::new(LinkState::default())),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock-tty0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
