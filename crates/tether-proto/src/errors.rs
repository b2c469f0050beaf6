//! Error types for framing and token decoding.

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Framing and token errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Caller passed an unusable parameter (frame size out of range)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Frame length field or frame buffer size disagrees with the frame size
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// Bytes that cannot be the prefix of any handshake token
    #[error("unrecognized handshake token {0:02x?}")]
    UnknownToken(Vec<u8>),

    /// Reassembled message exceeds the configured limit
    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge {
        /// Bytes accumulated so far
        size: usize,
        /// Configured limit
        max: usize,
    },
}

impl ProtocolError {
    /// Returns true for framing length violations.
    ///
    /// These fail the connection: the peer disagrees about frame geometry and
    /// nothing short of a new session fixes that.
    pub fn is_size_mismatch(&self) -> bool {
        matches!(self, Self::SizeMismatch(_) | Self::MessageTooLarge { .. })
    }
}
