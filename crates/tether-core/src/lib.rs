//! Tether Pairing Core
//!
//! Pairs two devices over an already-connected, reliable byte stream and then
//! carries messages over a double-encrypted, fixed-frame channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Channel (listen / connect / read / write)    │
//! ├──────────────────────────────────────────────┤
//! │ Handshaker: Ready/ACK sync, commitment and   │
//! │ decommitment exchange (WLAN) or pre-shared   │
//! │ secret (MANUAL)                              │
//! ├───────────────────────┬──────────────────────┤
//! │ tether-crypto         │ tether-proto         │
//! │ KeyAgreement          │ frames, tokens       │
//! └───────────────────────┴──────────────────────┘
//! ```
//!
//! # Modes
//!
//! - WLAN: commitment-protected X25519. Users compare the SAS on both devices
//!   and confirm with [`Channel::verified_oob`] before any write is allowed.
//! - MANUAL: a 32-byte secret moves out of band inside the identifier
//!   (`host:port:base64Secret`); the channel is verified as soon as it syncs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod handshake;
pub mod transport;

pub use channel::{Channel, CloseHandle};
pub use config::{DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_SYNC_TIMEOUT, PairingConfig};
pub use descriptor::{ChannelDescriptor, ChannelKind};
pub use error::{ChannelError, StatusCode};
pub use handshake::{Handshake, HandshakeState, Handshaker};
pub use tether_crypto::ShortAuthString;
