use crate::PowerState;
use lift_protocol::{CodecError, ControlWord};
use lift_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("transport: {0}")]
    Transport(TransportError),
    #[error("not connected")]
    NotConnected,
    #[error("control word {word} refused in state {state}")]
    InvalidTransition { state: PowerState, word: ControlWord },
    #[error("usage error: {0}")]
    Usage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Error::Codec(CodecError::Timeout),
            TransportError::Closed => Error::NotConnected,
            other => Error::Transport(other),
        }
    }
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Codec(CodecError::Timeout))
    }
}
