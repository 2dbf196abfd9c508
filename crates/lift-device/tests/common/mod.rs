#![allow(dead_code)]

use lift_protocol::{framed, od, sdo, Register};
use lift_transport::{CanFrame, CanId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct DriveState {
    pub registers: HashMap<(u16, u8), u32>,
    /// `(index, sub_index, value)` of every accepted write.
    pub writes: Vec<(u16, u8, u32)>,
    pub silent: bool,
    /// Abort any access to this index with the given code.
    pub abort_on: Option<(u16, u32)>,
    /// Sent ahead of every serial response.
    pub garbage_prefix: Vec<u8>,
    pub corrupt_checksum: bool,
}

/// A drive simulator answering SDO requests from a register map.
#[derive(Clone, Default)]
pub struct FakeDrive {
    state: Arc<Mutex<DriveState>>,
}

impl FakeDrive {
    /// A powered-up drive: switch-on disabled, lift at the bottom, no errors.
    pub fn new() -> Self {
        let drive = Self::default();
        drive.set(od::STATUS_WORD, 0x0250);
        drive.set(od::POSITION_ACTUAL, 0);
        drive.set(od::SPEED_ACTUAL, 0);
        drive.set(od::ERROR_CODE_PRIMARY, 0);
        drive.set(od::ERROR_CODE_SECONDARY, 0);
        drive
    }

    pub fn lock(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap()
    }

    pub fn set(&self, register: Register, value: u32) {
        self.lock().registers.insert(register.address(), value);
    }

    pub fn get(&self, register: Register) -> Option<u32> {
        self.lock().registers.get(&register.address()).copied()
    }

    pub fn writes(&self) -> Vec<(u16, u8, u32)> {
        self.lock().writes.clone()
    }

    pub fn take_writes(&self) -> Vec<(u16, u8, u32)> {
        std::mem::take(&mut self.lock().writes)
    }

    /// Values written to the control word, in order.
    pub fn control_words(&self) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|(index, _, _)| *index == od::CONTROL_WORD.index)
            .map(|(_, _, v)| v)
            .collect()
    }

    pub fn answer(&self, request: &[u8; 8]) -> Option<[u8; 8]> {
        let mut state = self.lock();
        if state.silent {
            return None;
        }
        let index = u16::from_le_bytes([request[1], request[2]]);
        let sub = request[3];
        let mux = [request[1], request[2], request[3]];
        let reply = |class: u8, value: u32| {
            let v = value.to_le_bytes();
            [class, mux[0], mux[1], mux[2], v[0], v[1], v[2], v[3]]
        };
        if let Some((abort_index, code)) = state.abort_on {
            if abort_index == index {
                return Some(reply(sdo::RESP_ABORT, code));
            }
        }
        match request[0] {
            sdo::CMD_READ => {
                let len = od::ALL
                    .iter()
                    .find(|r| r.address() == (index, sub))
                    .map_or(4, |r| r.len);
                match state.registers.get(&(index, sub)) {
                    Some(&value) => Some(reply(sdo::read_response_class(len), value)),
                    None => Some(reply(sdo::RESP_ABORT, 0x0602_0000)),
                }
            }
            cmd @ (sdo::CMD_WRITE_1 | sdo::CMD_WRITE_2 | sdo::CMD_WRITE_4) => {
                let n = match cmd {
                    sdo::CMD_WRITE_1 => 1,
                    sdo::CMD_WRITE_2 => 2,
                    _ => 4,
                };
                let mut bytes = [0u8; 4];
                bytes[..n].copy_from_slice(&request[4..4 + n]);
                let value = u32::from_le_bytes(bytes);
                state.registers.insert((index, sub), value);
                state.writes.push((index, sub, value));
                Some(reply(sdo::RESP_WRITE_ACK, 0))
            }
            _ => None,
        }
    }

    pub fn can_responder(self, node_id: u8) -> impl FnMut(&CanFrame) -> Option<CanFrame> + Send {
        let drive = self;
        move |frame| {
            if frame.id.raw() != 0x600 + u32::from(node_id) {
                return None;
            }
            let request: [u8; 8] = frame.payload().try_into().ok()?;
            let response = drive.answer(&request)?;
            CanFrame::new(CanId::standard(0x580 + u16::from(node_id))?, &response)
        }
    }

    /// Serial responder: every valid frame is answered, writes included.
    pub fn uart_responder(self) -> impl FnMut(&[u8]) -> Vec<u8> + Send {
        let drive = self;
        move |bytes| {
            if bytes.len() != framed::FRAME_LEN || bytes[0] != framed::SYNC || !framed::lrc_valid(bytes)
            {
                return Vec::new();
            }
            let mut request = [0u8; 8];
            request.copy_from_slice(&bytes[1..9]);
            let Some(response) = drive.answer(&request) else {
                return Vec::new();
            };
            let (mut out, corrupt) = {
                let state = drive.lock();
                (state.garbage_prefix.clone(), state.corrupt_checksum)
            };
            let mut frame = framed::wrap(response);
            if corrupt {
                frame[framed::FRAME_LEN - 1] = frame[framed::FRAME_LEN - 1].wrapping_add(1);
            }
            out.extend_from_slice(&frame);
            out
        }
    }
}

pub fn hex(s: &str) -> Vec<u8> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}
