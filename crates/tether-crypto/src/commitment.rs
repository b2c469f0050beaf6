//! Hash-and-MAC commitment scheme.
//!
//! The committer picks a random key `X` and mask `A` of the message length and
//! publishes
//!
//! ```text
//! tag(32) || H(24) || salt(16) || A(n) || B(n)
//!
//! H   = Argon2id(X, salt)
//! B   = message - A*X  mod 2^(8n)
//! tag = HMAC-SHA256_X(H || salt || A || B)
//! ```
//!
//! Revealing `X` later lets the receiver check `H` and `tag`, then recover
//! `message = B + A*X mod 2^(8n)`.
//!
//! # Security
//!
//! - Binding to `X`: finding another key with the same `H` means inverting a
//!   salted slow hash.
//! - Binding to `A`, `B`: the tag is keyed by `X`, which only the committer
//!   knows until it opens.
//! - Hiding: without `X`, `(A, B)` looks uniform because `A` is uniform. The
//!   modulus is the message length itself, so there is no separate
//!   statistical hiding margin.
//! - Opening checks both the hash and the tag before reporting, and the error
//!   never says which one failed.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    error::CryptoError,
    mask::{add_mod, mul_mod, sub_mod},
    slow_hash::{HASH_SIZE, SALT_SIZE, SlowHashParams, slow_hash},
};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 tag length.
pub const MAC_SIZE: usize = 32;

/// Public commitment to a fixed-length message.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Commitment {
    tag: [u8; MAC_SIZE],
    hash: [u8; HASH_SIZE],
    salt: [u8; SALT_SIZE],
    mask: Vec<u8>,
    masked: Vec<u8>,
}

impl Commitment {
    /// Wire length of a commitment to an `n`-byte message.
    pub const fn encoded_len(message_len: usize) -> usize {
        MAC_SIZE + HASH_SIZE + SALT_SIZE + 2 * message_len
    }

    /// Length of the committed message.
    pub fn message_len(&self) -> usize {
        self.mask.len()
    }

    /// Serialize as `tag || H || salt || A || B`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(self.message_len()));
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.mask);
        out.extend_from_slice(&self.masked);
        out
    }

    /// Parse a commitment to an `n`-byte message.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `bytes` is not exactly
    ///   [`Commitment::encoded_len`] long
    pub fn from_bytes(bytes: &[u8], message_len: usize) -> Result<Self, CryptoError> {
        let expected = Self::encoded_len(message_len);
        if message_len == 0 || bytes.len() != expected {
            return Err(CryptoError::InvalidArgument(format!(
                "commitment must be {expected} bytes, got {}",
                bytes.len()
            )));
        }

        let (tag, rest) = bytes.split_at(MAC_SIZE);
        let (hash, rest) = rest.split_at(HASH_SIZE);
        let (salt, rest) = rest.split_at(SALT_SIZE);
        let (mask, masked) = rest.split_at(message_len);

        let mut commitment = Self {
            tag: [0u8; MAC_SIZE],
            hash: [0u8; HASH_SIZE],
            salt: [0u8; SALT_SIZE],
            mask: mask.to_vec(),
            masked: masked.to_vec(),
        };
        commitment.tag.copy_from_slice(tag);
        commitment.hash.copy_from_slice(hash);
        commitment.salt.copy_from_slice(salt);

        Ok(commitment)
    }

    fn mac(&self, key: &[u8]) -> HmacSha256 {
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(&self.hash);
        mac.update(&self.salt);
        mac.update(&self.mask);
        mac.update(&self.masked);
        mac
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commitment")
            .field("message_len", &self.message_len())
            .finish_non_exhaustive()
    }
}

/// The committer's secret key `X`, revealed to open its commitment.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Decommitment(Vec<u8>);

impl Decommitment {
    /// Raw bytes of `X` for the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of `X` (equal to the message length).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for decommitments produced by [`CommitmentScheme`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Decommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decommitment({} bytes)", self.0.len())
    }
}

/// Commit to local messages and open one peer commitment.
///
/// Holds at most one received peer commitment. Opening consumes it whether or
/// not the decommitment matches.
#[derive(Debug)]
pub struct CommitmentScheme {
    message_len: usize,
    params: SlowHashParams,
    peer: Option<Commitment>,
}

impl CommitmentScheme {
    /// Create a scheme for `message_len`-byte messages.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `message_len` is zero or the slow hash
    ///   parameters are rejected
    pub fn new(message_len: usize, params: SlowHashParams) -> Result<Self, CryptoError> {
        if message_len == 0 {
            return Err(CryptoError::InvalidArgument("message length must be positive".into()));
        }
        params.validate()?;

        Ok(Self { message_len, params, peer: None })
    }

    /// Committed message length.
    pub fn message_len(&self) -> usize {
        self.message_len
    }

    /// Wire length of a commitment under this scheme.
    pub fn commitment_len(&self) -> usize {
        Commitment::encoded_len(self.message_len)
    }

    /// Wire length of a decommitment under this scheme.
    pub fn decommitment_len(&self) -> usize {
        self.message_len
    }

    /// Whether a peer commitment is waiting to be opened.
    pub fn has_peer_commitment(&self) -> bool {
        self.peer.is_some()
    }

    /// Commit to `message`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `message` is empty or not `message_len` bytes
    pub fn commit<R: RngCore + CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> Result<(Commitment, Decommitment), CryptoError> {
        if message.is_empty() || message.len() != self.message_len {
            return Err(CryptoError::InvalidArgument(format!(
                "message must be {} bytes, got {}",
                self.message_len,
                message.len()
            )));
        }

        let mut key = Zeroizing::new(vec![0u8; self.message_len]);
        let mut mask = vec![0u8; self.message_len];
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut mask);
        rng.fill_bytes(&mut salt);

        let product = mul_mod(&mask, &key);
        let masked = sub_mod(message, &product);
        let hash = slow_hash(&key, &salt, self.params)?;

        let mut commitment =
            Commitment { tag: [0u8; MAC_SIZE], hash, salt, mask, masked: masked.to_vec() };
        let tag = commitment.mac(&key).finalize().into_bytes();
        commitment.tag.copy_from_slice(&tag);

        Ok((commitment, Decommitment(key.to_vec())))
    }

    /// Store the peer's commitment until its decommitment arrives.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `bytes` has the wrong length
    pub fn receive_commitment(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        self.peer = Some(Commitment::from_bytes(bytes, self.message_len)?);
        Ok(())
    }

    /// Open the stored peer commitment with its revealed key `X`.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if no peer commitment was received
    /// - `CommitmentMismatch` if `decommitment` does not open the commitment,
    ///   whatever the reason (length, hash or tag)
    pub fn open(&mut self, decommitment: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let Some(peer) = self.peer.take() else {
            return Err(CryptoError::IllegalState("no peer commitment to open".into()));
        };

        if decommitment.len() != self.message_len {
            return Err(CryptoError::CommitmentMismatch);
        }

        let hash = Zeroizing::new(slow_hash(decommitment, &peer.salt, self.params)?);
        let hash_ok = hash[..].ct_eq(&peer.hash[..]);
        let tag_ok = Choice::from(u8::from(peer.mac(decommitment).verify_slice(&peer.tag).is_ok()));

        if !bool::from(hash_ok & tag_ok) {
            return Err(CryptoError::CommitmentMismatch);
        }

        let product = mul_mod(&peer.mask, decommitment);
        Ok(add_mod(&peer.masked, &product))
    }

    /// Drop any stored peer commitment.
    pub fn clear(&mut self) {
        self.peer = None;
    }
}
