//! Ephemeral identity and the verification nonce behind the SAS.

use std::fmt;

use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Size of an encoded X25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the raw X25519 shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Ephemeral X25519 keypair owned by one endpoint for one pairing attempt.
///
/// The private scalar is zeroized on drop.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key as sent inside the commitment message.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// X25519 with the peer's public key.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the peer key is a low-order point, which would
    ///   make the shared secret independent of our private key
    pub fn agree(
        &self,
        peer_public: [u8; PUBLIC_KEY_SIZE],
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_SIZE]>, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidArgument("non-contributory peer public key".into()));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("public", &self.public.as_bytes()).finish_non_exhaustive()
    }
}

/// Short random nonce merged with the peer's to form the SAS.
///
/// Mutated exactly once, by [`VerificationNonce::merge`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VerificationNonce {
    bytes: Vec<u8>,
    #[zeroize(skip)]
    merged: bool,
}

impl VerificationNonce {
    /// Generate `len` random bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `len` is zero
    pub fn generate<R: RngCore + CryptoRng>(len: usize, rng: &mut R) -> Result<Self, CryptoError> {
        if len == 0 {
            return Err(CryptoError::InvalidArgument("nonce length must be positive".into()));
        }
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Ok(Self { bytes, merged: false })
    }

    /// Current nonce bytes (local before merging, shared after).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Nonce length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: zero-length nonces cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the peer nonce has been merged in.
    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// XOR the peer's nonce into ours. Allowed once.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if already merged
    /// - `InvalidArgument` if the lengths differ
    pub fn merge(&mut self, peer: &[u8]) -> Result<(), CryptoError> {
        if self.merged {
            return Err(CryptoError::IllegalState("verification nonce already merged".into()));
        }
        if peer.len() != self.bytes.len() {
            return Err(CryptoError::InvalidArgument(format!(
                "peer nonce must be {} bytes, got {}",
                self.bytes.len(),
                peer.len()
            )));
        }

        for (own, theirs) in self.bytes.iter_mut().zip(peer) {
            *own ^= theirs;
        }
        self.merged = true;

        Ok(())
    }

    /// The short authentication string both users compare.
    ///
    /// # Errors
    ///
    /// - `IllegalState` before the peer nonce is merged
    pub fn sas(&self) -> Result<ShortAuthString, CryptoError> {
        if !self.merged {
            return Err(CryptoError::IllegalState("verification nonce not merged yet".into()));
        }
        Ok(ShortAuthString(self.bytes.clone()))
    }
}

impl fmt::Debug for VerificationNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationNonce")
            .field("len", &self.bytes.len())
            .field("merged", &self.merged)
            .finish()
    }
}

/// Merged verification nonce, displayed as dash-separated hex (`3A-F1-07`).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ShortAuthString(Vec<u8>);

impl ShortAuthString {
    /// Raw merged nonce bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ShortAuthString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShortAuthString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortAuthString({self})")
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn both_sides_agree_on_secret() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let alice = Identity::generate(&mut rng);
        let bob = Identity::generate(&mut rng);

        let ab = alice.agree(bob.public_bytes()).unwrap();
        let ba = bob.agree(alice.public_bytes()).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn low_order_peer_key_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let alice = Identity::generate(&mut rng);

        assert!(matches!(alice.agree([0u8; 32]), Err(CryptoError::InvalidArgument(_))));
    }

    #[test]
    fn zero_length_nonce_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        assert!(matches!(
            VerificationNonce::generate(0, &mut rng),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn merge_is_xor_and_once_only() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let mut nonce = VerificationNonce::generate(3, &mut rng).unwrap();
        let original = nonce.as_bytes().to_vec();

        nonce.merge(&[0xFF, 0x00, 0x0F]).unwrap();
        assert!(nonce.is_merged());
        assert_eq!(nonce.as_bytes()[0], original[0] ^ 0xFF);
        assert_eq!(nonce.as_bytes()[1], original[1]);
        assert_eq!(nonce.as_bytes()[2], original[2] ^ 0x0F);

        assert!(matches!(nonce.merge(&[0, 0, 0]), Err(CryptoError::IllegalState(_))));
    }

    #[test]
    fn merge_rejects_length_mismatch() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let mut nonce = VerificationNonce::generate(3, &mut rng).unwrap();

        assert!(matches!(nonce.merge(&[1, 2]), Err(CryptoError::InvalidArgument(_))));
        assert!(!nonce.is_merged());
    }

    #[test]
    fn sas_requires_merge() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let nonce = VerificationNonce::generate(3, &mut rng).unwrap();
        assert!(matches!(nonce.sas(), Err(CryptoError::IllegalState(_))));
    }

    #[test]
    fn sas_displays_as_hex_groups() {
        let sas = ShortAuthString(vec![0x3A, 0xF1, 0x07]);
        assert_eq!(sas.to_string(), "3A-F1-07");
    }
}
