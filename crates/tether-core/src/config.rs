//! Pairing and channel configuration.

use std::time::Duration;

use tether_crypto::{
    DEFAULT_NONCE_LEN, FRAME_OVERHEAD, IV_SIZE, KeyAgreementParams, SlowHashParams, TAG_SIZE,
};
use tether_proto::{DEFAULT_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, validate_frame_size};

use crate::error::ChannelError;

/// Total time allowed for the Ready/ACK synchronization.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);

/// Time allowed to receive each commitment and decommitment.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pairing configuration.
///
/// Both peers must agree on every size and on the slow hash cost, otherwise
/// the exchanges fail on length or commitments never open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Budget for the whole synchronization phase
    pub sync_timeout: Duration,
    /// Budget for each commitment/decommitment read
    pub exchange_timeout: Duration,
    /// Verification nonce length (SAS bytes)
    pub nonce_len: usize,
    /// AEAD IV length
    pub iv_len: usize,
    /// AEAD tag length
    pub tag_len: usize,
    /// Frame payload size; every encrypted frame carries this many bytes
    pub frame_size: usize,
    /// Largest message accepted or sent
    pub max_message_size: usize,
    /// Commitment slow hash cost
    pub slow_hash: SlowHashParams,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            nonce_len: DEFAULT_NONCE_LEN,
            iv_len: IV_SIZE,
            tag_len: TAG_SIZE,
            frame_size: DEFAULT_FRAME_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            slow_hash: SlowHashParams::default(),
        }
    }
}

impl PairingConfig {
    /// Cheap slow hash and small frames for tests and local development.
    ///
    /// Not interoperable with [`PairingConfig::default`] peers.
    pub fn development() -> Self {
        Self { frame_size: 64, slow_hash: SlowHashParams::MINIMAL, ..Self::default() }
    }

    /// Reject unusable sizes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for zero sizes or timeouts, a frame size above the
    ///   15-bit header limit, or parameters the key agreement cannot use
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.sync_timeout.is_zero() || self.exchange_timeout.is_zero() {
            return Err(ChannelError::InvalidArgument("timeouts must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(ChannelError::InvalidArgument("max message size must be positive".into()));
        }
        validate_frame_size(self.frame_size)?;
        self.key_agreement_params().validate()?;
        Ok(())
    }

    /// Parameters for the underlying [`tether_crypto::KeyAgreement`].
    pub fn key_agreement_params(&self) -> KeyAgreementParams {
        KeyAgreementParams {
            nonce_len: self.nonce_len,
            iv_len: self.iv_len,
            tag_len: self.tag_len,
            slow_hash: self.slow_hash,
            ..KeyAgreementParams::default()
        }
    }

    /// Length of every ciphertext on the wire after pairing.
    pub fn wire_frame_len(&self) -> usize {
        HEADER_SIZE + self.frame_size + FRAME_OVERHEAD
    }
}
