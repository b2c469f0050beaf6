//! Error types for the pairing handshake and channel.
//!
//! We avoid using `std::io::Error` for protocol logic: the handshake needs to
//! tell retryable failures (timeouts, bad tokens, commitments that do not
//! open) from caller bugs, and the data path maps onto fixed status codes.

use std::{io, time::Duration};

use tether_crypto::CryptoError;
use tether_proto::ProtocolError;
use thiserror::Error;

/// Numeric status codes exposed at the channel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Operation completed
    Success = 0,
    /// Reading from the transport failed
    Read = -1,
    /// Writing to the transport failed
    Write = -2,
    /// A frame failed authentication
    WrongTag = -3,
    /// Non-blocking read found no complete message
    NotAvailable = -4,
    /// A frame could not be parsed as ciphertext
    InvalidCiphertext = -5,
}

impl StatusCode {
    /// Numeric value.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors from pairing and from the verified channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Malformed size, identifier or secret. Caller bug.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the current state (e.g. write before the SAS
    /// was confirmed)
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Peer sent an unexpected or duplicate token, or aborted with FIN
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A bounded wait expired
    #[error("{phase} timed out after {elapsed:?}")]
    Timeout {
        /// Handshake phase that was waiting
        phase: &'static str,
        /// Budget that was exhausted
        elapsed: Duration,
    },

    /// Peer commitment did not open. Possible active attack.
    #[error("commitment mismatch")]
    CommitmentMismatch,

    /// Frame length field or message size out of bounds
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// A received frame failed authentication
    #[error("authentication tag mismatch")]
    WrongTag,

    /// Non-blocking read found no complete message
    #[error("no complete message available")]
    NotAvailable,

    /// A received frame has an impossible ciphertext layout
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Transport read failed or the peer closed the stream
    #[error("read failed: {0}")]
    Read(String),

    /// Transport write failed
    #[error("write failed: {0}")]
    Write(String),

    /// Connecting, binding or accepting failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Channel was closed locally
    #[error("channel closed")]
    Closed,
}

impl ChannelError {
    /// Returns true if a fresh session may succeed where this one failed.
    ///
    /// Commitment mismatches are retryable only because the identity is
    /// regenerated before the session reports failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_) | Self::Timeout { .. } | Self::CommitmentMismatch)
    }

    /// Boundary status code, for the errors that have one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Read(_) => Some(StatusCode::Read),
            Self::Write(_) => Some(StatusCode::Write),
            Self::WrongTag => Some(StatusCode::WrongTag),
            Self::NotAvailable => Some(StatusCode::NotAvailable),
            Self::InvalidCiphertext(_) => Some(StatusCode::InvalidCiphertext),
            _ => None,
        }
    }
}

/// Convert `ChannelError` to `io::Error` for use behind I/O APIs.
///
/// This is only for boundary conversion - internally we use `ChannelError`.
impl From<ChannelError> for io::Error {
    fn from(err: ChannelError) -> Self {
        let kind = match &err {
            ChannelError::Timeout { .. } => io::ErrorKind::TimedOut,
            ChannelError::NotAvailable => io::ErrorKind::WouldBlock,
            ChannelError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            ChannelError::Closed => io::ErrorKind::NotConnected,
            ChannelError::Read(_) => io::ErrorKind::UnexpectedEof,
            ChannelError::Write(_) => io::ErrorKind::BrokenPipe,
            ChannelError::IllegalState(_)
            | ChannelError::ProtocolViolation(_)
            | ChannelError::CommitmentMismatch
            | ChannelError::SizeMismatch(_)
            | ChannelError::WrongTag
            | ChannelError::InvalidCiphertext(_) => io::ErrorKind::InvalidData,
            ChannelError::Transport(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CryptoError> for ChannelError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            CryptoError::IllegalState(msg) => Self::IllegalState(msg),
            CryptoError::CommitmentMismatch => Self::CommitmentMismatch,
        }
    }
}

impl From<ProtocolError> for ChannelError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            ProtocolError::UnknownToken(_) => Self::ProtocolViolation(err.to_string()),
            ProtocolError::SizeMismatch(_) | ProtocolError::MessageTooLarge { .. } => {
                Self::SizeMismatch(err.to_string())
            },
        }
    }
}
