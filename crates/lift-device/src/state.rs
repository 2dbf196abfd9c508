//! Drive power states and the control words that move between them.
//!
//! The drive follows the CiA-402 power state machine. Control words are classified by the
//! command bits the drive looks at (bits 0..3, plus bit 7 for fault reset); the remaining bits
//! (new set-point, relative, halt) do not change the power state.

use crate::{Error, Result};
use lift_protocol::ControlWord;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    NotReady,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    Fault,
}

impl PowerState {
    /// Decode the state bits of a status word (0x6041).
    pub fn from_status_word(status: u16) -> Option<Self> {
        match status & 0x4F {
            0x00 => return Some(Self::NotReady),
            0x40 => return Some(Self::SwitchOnDisabled),
            0x08 | 0x0F => return Some(Self::Fault),
            _ => {}
        }
        match status & 0x6F {
            0x21 => Some(Self::ReadyToSwitchOn),
            0x23 => Some(Self::SwitchedOn),
            0x27 => Some(Self::OperationEnabled),
            0x07 => Some(Self::QuickStopActive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::SwitchOnDisabled => "switch_on_disabled",
            Self::ReadyToSwitchOn => "ready_to_switch_on",
            Self::SwitchedOn => "switched_on",
            Self::OperationEnabled => "operation_enabled",
            Self::QuickStopActive => "quick_stop_active",
            Self::Fault => "fault",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power command carried by a control word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    DisableVoltage,
    QuickStop,
    Shutdown,
    SwitchOn,
    EnableOperation,
}

impl Command {
    pub fn of(word: ControlWord) -> Self {
        let w = word.0;
        if w & 0x02 == 0 {
            Self::DisableVoltage
        } else if w & 0x04 == 0 {
            Self::QuickStop
        } else if w & 0x01 == 0 {
            Self::Shutdown
        } else if w & 0x08 == 0 {
            Self::SwitchOn
        } else {
            Self::EnableOperation
        }
    }
}

/// State reached by sending `word` in `state`, or `None` if the drive would ignore it.
pub fn transition(state: PowerState, word: ControlWord) -> Option<PowerState> {
    use Command::*;
    use PowerState::*;

    if state == Fault {
        return word.is_fault_reset().then_some(SwitchOnDisabled);
    }
    match (state, Command::of(word)) {
        (NotReady, _) => None,
        (SwitchOnDisabled, Shutdown) => Some(ReadyToSwitchOn),
        (SwitchOnDisabled, EnableOperation) => Some(OperationEnabled),
        (SwitchOnDisabled, _) => None,
        (ReadyToSwitchOn, SwitchOn) => Some(SwitchedOn),
        (ReadyToSwitchOn, EnableOperation) => Some(OperationEnabled),
        (ReadyToSwitchOn, Shutdown) => Some(ReadyToSwitchOn),
        (ReadyToSwitchOn, DisableVoltage | QuickStop) => Some(SwitchOnDisabled),
        (SwitchedOn, EnableOperation) => Some(OperationEnabled),
        (SwitchedOn, SwitchOn) => Some(SwitchedOn),
        (SwitchedOn, Shutdown) => Some(ReadyToSwitchOn),
        (SwitchedOn, DisableVoltage | QuickStop) => Some(SwitchOnDisabled),
        (OperationEnabled, EnableOperation) => Some(OperationEnabled),
        (OperationEnabled, SwitchOn) => Some(SwitchedOn),
        (OperationEnabled, Shutdown) => Some(ReadyToSwitchOn),
        (OperationEnabled, QuickStop) => Some(QuickStopActive),
        (OperationEnabled, DisableVoltage) => Some(SwitchOnDisabled),
        (QuickStopActive, EnableOperation) => Some(OperationEnabled),
        (QuickStopActive, QuickStop) => Some(QuickStopActive),
        (QuickStopActive, DisableVoltage) => Some(SwitchOnDisabled),
        (QuickStopActive, _) => None,
        (Fault, _) => None,
    }
}

/// Local model of the drive's power state.
///
/// Starts in `SwitchOnDisabled`, the state a drive reports after power-up; call
/// [`PowerStateMachine::observe`] with a status word to resynchronise.
#[derive(Clone, Debug)]
pub struct PowerStateMachine {
    state: PowerState,
}

impl Default for PowerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerStateMachine {
    pub fn new() -> Self {
        Self {
            state: PowerState::SwitchOnDisabled,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Validate `word` without changing state.
    pub fn check(&self, word: ControlWord) -> Result<PowerState> {
        transition(self.state, word).ok_or(Error::InvalidTransition {
            state: self.state,
            word,
        })
    }

    /// Apply `word` once the drive has accepted it.
    pub fn advance(&mut self, word: ControlWord) -> Result<PowerState> {
        let next = self.check(word)?;
        if next != self.state {
            tracing::info!(from = %self.state, to = %next, %word, "power state transition");
        }
        self.state = next;
        Ok(next)
    }

    /// Adopt the state reported by the drive. Unknown bit patterns leave the model unchanged.
    pub fn observe(&mut self, status_word: u16) -> PowerState {
        match PowerState::from_status_word(status_word) {
            Some(s) => {
                if s != self.state {
                    tracing::info!(from = %self.state, to = %s, status_word, "power state resync");
                }
                self.state = s;
            }
            None => {
                tracing::warn!(status_word, "unrecognised status word");
            }
        }
        self.state
    }
}
