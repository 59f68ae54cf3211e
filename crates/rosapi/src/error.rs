use std::fmt;

use rosapi_proto::{ProtoError, Sentence};

/// Error reported by the device inside an exchange (`!trap` or `!fatal`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// The full error sentence as received.
    pub sentence: Sentence,
}

impl DeviceError {
    /// The device-supplied `message` attribute, or a synthesized fallback
    /// naming the whole sentence.
    pub fn message(&self) -> String {
        match self.sentence.get("message") {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => format!("unknown error: {}", self.sentence),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from device: {}", self.message())
    }
}

impl std::error::Error for DeviceError {}

/// Errors surfaced by client operations.
///
/// `Clone` because a connection failure is fanned out to every outstanding
/// exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Framing or I/O failure on the connection.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// The device reported an error for this exchange.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A reply sentence began with a word outside the known vocabulary.
    /// Terminal for the owning exchange only.
    #[error("unknown reply word: {}", .0.word)]
    UnknownReply(Sentence),

    /// Concurrent mode was already enabled by an earlier call.
    #[error("concurrent mode already started")]
    AlreadyAsync,

    /// The dispatch loop has ended; no new exchange can be registered.
    #[error("dispatch loop ended - probably read error")]
    AsyncLoopEnded,

    /// The login exchange failed before credentials were accepted.
    #[error("login failed: {0}")]
    Login(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Proto(ProtoError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
