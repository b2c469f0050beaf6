//! Double-layer AES-128-GCM over a 32-byte shared secret.
//!
//! ```text
//! inner = AEAD(inner_key, inner_iv, plaintext)
//! wire  = outer_iv || AEAD(outer_key, outer_iv, inner_iv || inner)
//! ```
//!
//! The outer layer authenticates the inner IV together with the inner
//! ciphertext, so an attacker cannot swap IVs between frames.

use aes_gcm::{
    Aes128Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{error::CryptoError, identity::SHARED_SECRET_SIZE};

/// Size of each AEAD subkey.
pub const SUBKEY_SIZE: usize = 16;

/// AES-GCM IV size.
pub const IV_SIZE: usize = 12;

/// AES-GCM tag size.
pub const TAG_SIZE: usize = 16;

/// Ciphertext expansion of [`SecureChannel::encrypt`].
pub const FRAME_OVERHEAD: usize = 2 * (IV_SIZE + TAG_SIZE);

/// Agreed secret split into the inner and outer AEAD subkeys.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecretMaterial {
    inner: [u8; SUBKEY_SIZE],
    outer: [u8; SUBKEY_SIZE],
}

impl SharedSecretMaterial {
    /// Split a raw 32-byte secret: first half inner, second half outer.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `secret` is not exactly 32 bytes
    pub fn split(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.len() != SHARED_SECRET_SIZE {
            return Err(CryptoError::InvalidArgument(format!(
                "shared secret must be {SHARED_SECRET_SIZE} bytes, got {}",
                secret.len()
            )));
        }

        let mut material = Self { inner: [0u8; SUBKEY_SIZE], outer: [0u8; SUBKEY_SIZE] };
        material.inner.copy_from_slice(&secret[..SUBKEY_SIZE]);
        material.outer.copy_from_slice(&secret[SUBKEY_SIZE..]);
        Ok(material)
    }
}

/// Keyed double-AEAD channel.
pub struct SecureChannel {
    keys: SharedSecretMaterial,
}

impl SecureChannel {
    /// Channel over already-split key material.
    pub fn new(keys: SharedSecretMaterial) -> Self {
        Self { keys }
    }

    /// Channel over a raw 32-byte secret.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `secret` is not exactly 32 bytes
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::new(SharedSecretMaterial::split(secret)?))
    }

    /// Bytes added to every plaintext by [`SecureChannel::encrypt`].
    pub fn frame_overhead(&self) -> usize {
        FRAME_OVERHEAD
    }

    /// Encrypt under fresh random inner and outer IVs.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the plaintext exceeds the AES-GCM length limit
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut inner_iv = [0u8; IV_SIZE];
        let mut outer_iv = [0u8; IV_SIZE];
        rng.fill_bytes(&mut inner_iv);
        rng.fill_bytes(&mut outer_iv);

        let inner = seal(&self.keys.inner, &inner_iv, plaintext)?;

        let mut layered = Zeroizing::new(Vec::with_capacity(IV_SIZE + inner.len()));
        layered.extend_from_slice(&inner_iv);
        layered.extend_from_slice(&inner);
        let outer = seal(&self.keys.outer, &outer_iv, &layered)?;

        let mut wire = Vec::with_capacity(IV_SIZE + outer.len());
        wire.extend_from_slice(&outer_iv);
        wire.extend_from_slice(&outer);

        debug_assert_eq!(wire.len(), plaintext.len() + FRAME_OVERHEAD);
        Ok(wire)
    }

    /// Decrypt and authenticate both layers.
    ///
    /// Returns `Ok(None)` when either tag fails. That is an expected outcome
    /// for garbage, replayed or tampered input, and both layers fail the same
    /// way.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `ciphertext` is shorter than the fixed overhead
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>, CryptoError> {
        if ciphertext.len() < FRAME_OVERHEAD {
            return Err(CryptoError::InvalidArgument(format!(
                "ciphertext must be at least {FRAME_OVERHEAD} bytes, got {}",
                ciphertext.len()
            )));
        }

        let (outer_iv, outer) = ciphertext.split_at(IV_SIZE);
        let Some(layered) = open(&self.keys.outer, outer_iv, outer) else {
            return Ok(None);
        };
        let layered = Zeroizing::new(layered);

        let (inner_iv, inner) = layered.split_at(IV_SIZE);
        Ok(open(&self.keys.inner, inner_iv, inner))
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel").finish_non_exhaustive()
    }
}

fn seal(key: &[u8; SUBKEY_SIZE], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes128Gcm::new(key.into())
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::InvalidArgument("plaintext too large for AES-GCM".into()))
}

fn open(key: &[u8; SUBKEY_SIZE], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    Aes128Gcm::new(key.into()).decrypt(Nonce::from_slice(iv), ciphertext).ok()
}
