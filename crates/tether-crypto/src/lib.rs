//! Tether Cryptographic Primitives
//!
//! Building blocks for pairing two devices over an untrusted link. Every
//! operation that needs randomness takes the RNG as a parameter, so tests can
//! drive the whole protocol from a seeded generator.
//!
//! # Pairing Flow
//!
//! ```text
//! Identity (X25519) + VerificationNonce
//!        │
//!        ▼
//! Commitment(public_key || nonce)  ──exchange──>  peer stores it
//!        │
//!        ▼
//! Decommitment (X)                 ──exchange──>  peer opens, runs ECDH
//!        │
//!        ▼
//! 32-byte secret ──split──> inner key | outer key
//!        │
//!        ▼
//! SecureChannel: outer_iv || AEAD_outer(inner_iv || AEAD_inner(plaintext))
//! ```
//!
//! # Security
//!
//! Man-in-the-middle resistance:
//! - Both commitments cross the wire before either is opened, so nobody can
//!   choose a key or nonce after seeing the peer's
//! - The merged nonce (SAS) differs on the two devices if anyone substituted
//!   keys, and users compare it out of band
//!
//! Secret hygiene:
//! - Private keys, nonces, decommitments and subkeys zeroize on drop
//! - Opening a commitment reports a single opaque mismatch error
//! - Tag failures on decrypt are a value (`Ok(None)`), identical for both
//!   layers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commitment;
pub mod error;
pub mod identity;
pub mod key_agreement;
mod mask;
pub mod secure_channel;
pub mod slow_hash;

pub use commitment::{Commitment, CommitmentScheme, Decommitment, MAC_SIZE};
pub use error::CryptoError;
pub use identity::{Identity, PUBLIC_KEY_SIZE, SHARED_SECRET_SIZE, ShortAuthString, VerificationNonce};
pub use key_agreement::{Curve, DEFAULT_NONCE_LEN, KexAlgorithm, KeyAgreement, KeyAgreementParams};
pub use secure_channel::{FRAME_OVERHEAD, IV_SIZE, SecureChannel, SharedSecretMaterial, TAG_SIZE};
pub use slow_hash::{HASH_SIZE, SALT_SIZE, SlowHashParams};
