//! Tether Wire Protocol
//!
//! Framing and synchronization tokens, independent of any transport. Nothing
//! here performs I/O: callers feed bytes in and take frames or tokens out.
//!
//! # Frames
//!
//! ```text
//! ┌──────────┬─────────────────────────────────────┐
//! │ header   │ body: frame_size bytes               │
//! │ 2 bytes  │ data, then random filler on the last │
//! └──────────┴─────────────────────────────────────┘
//! ```
//!
//! A message of `len` bytes always becomes `len / frame_size + 1` frames. Each
//! frame is encrypted separately, so every ciphertext has the same length.
//!
//! # Tokens
//!
//! `Ready`, `ACK` and `FIN` are raw ASCII with no delimiter; see
//! [`SyncToken::decode`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod token;

pub use errors::{ProtocolError, Result};
pub use frame::{
    DEFAULT_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE, Frame, FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE,
    Reassembler, reassemble, split, validate_frame_size,
};
pub use token::{MAX_TOKEN_LEN, SyncToken};
