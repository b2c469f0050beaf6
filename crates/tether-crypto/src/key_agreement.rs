//! Commitment-protected X25519 key agreement.
//!
//! Each endpoint commits to `public_key || verification_nonce`, exchanges
//! commitments, then reveals decommitments. Because both commitments are on
//! the wire before either is opened, neither side can pick its key or nonce
//! after seeing the other's, so a man in the middle shows up as differing
//! SAS values on the two devices.
//!
//! ```text
//! initialize ──> commit ──> receive_commitment ──> open_peer_commitment ──> finish
//!                                                   (ECDH, subkey split,
//!                                                    nonce merge)
//! ```

use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::{
    commitment::{Commitment, CommitmentScheme, Decommitment},
    error::CryptoError,
    identity::{Identity, PUBLIC_KEY_SIZE, ShortAuthString, VerificationNonce},
    secure_channel::{IV_SIZE, SecureChannel, TAG_SIZE},
    slow_hash::SlowHashParams,
};

/// Default verification nonce length (3 bytes, six hex digits of SAS).
pub const DEFAULT_NONCE_LEN: usize = 3;

/// Elliptic curve for the ephemeral identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    /// Curve25519 in Montgomery form.
    #[default]
    X25519,
}

/// Key agreement algorithm over [`Curve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KexAlgorithm {
    /// Elliptic-curve Diffie-Hellman.
    #[default]
    Ecdh,
}

/// Sizes and algorithms for one key agreement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAgreementParams {
    /// Identity curve.
    pub curve: Curve,
    /// Key agreement algorithm.
    pub kex: KexAlgorithm,
    /// Verification nonce length in bytes.
    pub nonce_len: usize,
    /// AEAD IV length in bytes.
    pub iv_len: usize,
    /// AEAD tag length in bytes.
    pub tag_len: usize,
    /// Cost of the commitment's slow hash.
    pub slow_hash: SlowHashParams,
}

impl Default for KeyAgreementParams {
    fn default() -> Self {
        Self {
            curve: Curve::X25519,
            kex: KexAlgorithm::Ecdh,
            nonce_len: DEFAULT_NONCE_LEN,
            iv_len: IV_SIZE,
            tag_len: TAG_SIZE,
            slow_hash: SlowHashParams::default(),
        }
    }
}

impl KeyAgreementParams {
    /// Reject zero sizes and unsupported combinations.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.nonce_len == 0 || self.iv_len == 0 || self.tag_len == 0 {
            return Err(CryptoError::InvalidArgument(format!(
                "sizes must be positive (nonce {}, iv {}, tag {})",
                self.nonce_len, self.iv_len, self.tag_len
            )));
        }

        match (self.curve, self.kex) {
            (Curve::X25519, KexAlgorithm::Ecdh) => {},
        }

        // AES-128-GCM is the only AEAD on offer
        if self.iv_len != IV_SIZE || self.tag_len != TAG_SIZE {
            return Err(CryptoError::InvalidArgument(format!(
                "unsupported AEAD sizes: iv {} tag {} (expected {IV_SIZE}/{TAG_SIZE})",
                self.iv_len, self.tag_len
            )));
        }

        self.slow_hash.validate()
    }

    /// Length of `public_key || nonce`.
    pub fn commitment_message_len(&self) -> usize {
        PUBLIC_KEY_SIZE + self.nonce_len
    }

    /// Ciphertext expansion of the resulting channel.
    pub fn frame_overhead(&self) -> usize {
        2 * (self.iv_len + self.tag_len)
    }
}

/// One endpoint's side of the commitment-protected key agreement.
///
/// Owns the ephemeral [`Identity`] and [`VerificationNonce`]; both are
/// replaced (and the old values zeroized) by [`KeyAgreement::regenerate`].
#[derive(Debug)]
pub struct KeyAgreement {
    params: KeyAgreementParams,
    identity: Identity,
    nonce: VerificationNonce,
    scheme: CommitmentScheme,
    local: Option<Decommitment>,
    channel: Option<SecureChannel>,
}

impl KeyAgreement {
    /// Generate an identity and verification nonce.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if any size is zero or the parameters name an
    ///   unsupported algorithm
    pub fn initialize<R: RngCore + CryptoRng>(
        params: KeyAgreementParams,
        rng: &mut R,
    ) -> Result<Self, CryptoError> {
        params.validate()?;

        Ok(Self {
            params,
            identity: Identity::generate(rng),
            nonce: VerificationNonce::generate(params.nonce_len, rng)?,
            scheme: CommitmentScheme::new(params.commitment_message_len(), params.slow_hash)?,
            local: None,
            channel: None,
        })
    }

    /// Parameters this agreement was built with.
    pub fn params(&self) -> &KeyAgreementParams {
        &self.params
    }

    /// Wire length of a commitment.
    pub fn commitment_len(&self) -> usize {
        self.scheme.commitment_len()
    }

    /// Wire length of a decommitment.
    pub fn decommitment_len(&self) -> usize {
        self.scheme.decommitment_len()
    }

    /// Local public key, exposed for logging and tests.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.identity.public_bytes()
    }

    /// `public_key || nonce`, the plaintext bound by our commitment.
    pub fn build_commitment_message(&self) -> Zeroizing<Vec<u8>> {
        let mut message = Zeroizing::new(Vec::with_capacity(self.params.commitment_message_len()));
        message.extend_from_slice(&self.identity.public_bytes());
        message.extend_from_slice(self.nonce.as_bytes());
        message
    }

    /// Commit to our message, keeping the decommitment for later.
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Commitment, CryptoError> {
        let message = self.build_commitment_message();
        let (commitment, decommitment) = self.scheme.commit(&message, rng)?;
        self.local = Some(decommitment);
        Ok(commitment)
    }

    /// Our decommitment, once [`KeyAgreement::commit`] has run.
    pub fn decommitment(&self) -> Result<&Decommitment, CryptoError> {
        self.local
            .as_ref()
            .ok_or_else(|| CryptoError::IllegalState("no local commitment issued".into()))
    }

    /// Store the peer's commitment.
    pub fn receive_commitment(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        self.scheme.receive_commitment(bytes)
    }

    /// Open the peer's commitment and derive the channel keys.
    ///
    /// On success the raw X25519 secret is split into inner/outer subkeys and
    /// the peer nonce is merged into ours.
    ///
    /// # Errors
    ///
    /// - `CommitmentMismatch` if the decommitment does not open
    /// - `IllegalState` if no commitment was received or keys already exist
    /// - `InvalidArgument` if the peer key is degenerate
    pub fn open_peer_commitment(&mut self, decommitment: &[u8]) -> Result<(), CryptoError> {
        if self.channel.is_some() {
            return Err(CryptoError::IllegalState("channel already keyed".into()));
        }

        let message = self.scheme.open(decommitment)?;
        let (public, peer_nonce) = message.split_at(PUBLIC_KEY_SIZE);

        let mut peer_public = [0u8; PUBLIC_KEY_SIZE];
        peer_public.copy_from_slice(public);
        let secret = self.identity.agree(peer_public)?;

        self.nonce.merge(peer_nonce)?;
        self.channel = Some(SecureChannel::from_secret(secret.as_slice())?);
        self.local = None;

        Ok(())
    }

    /// Skip agreement and key the channel from an out-of-band secret.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `secret` is not exactly 32 bytes
    pub fn set_preshared_secret(&mut self, secret: &[u8]) -> Result<(), CryptoError> {
        self.channel = Some(SecureChannel::from_secret(secret)?);
        Ok(())
    }

    /// Whether channel keys exist.
    pub fn is_keyed(&self) -> bool {
        self.channel.is_some()
    }

    /// Our verification nonce (merged once the peer commitment opened).
    pub fn verification_nonce(&self) -> &VerificationNonce {
        &self.nonce
    }

    /// Encrypt through the keyed channel.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if no subkeys are set
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        self.keyed()?.encrypt(plaintext, rng)
    }

    /// Decrypt through the keyed channel. `Ok(None)` on tag failure.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if no subkeys are set
    /// - `InvalidArgument` if the input is shorter than the overhead
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>, CryptoError> {
        self.keyed()?.decrypt(ciphertext)
    }

    /// Deterministic ciphertext expansion, `2 * (iv_len + tag_len)`.
    pub fn frame_overhead(&self) -> usize {
        self.params.frame_overhead()
    }

    /// Throw away all session state and start over with a fresh identity.
    ///
    /// Old secrets are zeroized as they are dropped.
    pub fn regenerate<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), CryptoError> {
        self.identity = Identity::generate(rng);
        self.nonce = VerificationNonce::generate(self.params.nonce_len, rng)?;
        self.scheme.clear();
        self.local = None;
        self.channel = None;
        Ok(())
    }

    /// Hand over the keyed channel and SAS, then regenerate.
    ///
    /// The SAS is `None` when the channel was keyed from a pre-shared secret.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if no channel keys exist
    pub fn finish<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(SecureChannel, Option<ShortAuthString>), CryptoError> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| CryptoError::IllegalState("channel not keyed".into()))?;
        let sas = self.nonce.is_merged().then(|| self.nonce.sas()).transpose()?;

        self.regenerate(rng)?;
        Ok((channel, sas))
    }

    fn keyed(&self) -> Result<&SecureChannel, CryptoError> {
        self.channel.as_ref().ok_or_else(|| CryptoError::IllegalState("channel not keyed".into()))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn params() -> KeyAgreementParams {
        KeyAgreementParams { slow_hash: SlowHashParams::MINIMAL, ..KeyAgreementParams::default() }
    }

    fn pair(rng: &mut ChaCha20Rng) -> (KeyAgreement, KeyAgreement) {
        let mut alice = KeyAgreement::initialize(params(), rng).unwrap();
        let mut bob = KeyAgreement::initialize(params(), rng).unwrap();

        let ca = alice.commit(rng).unwrap();
        let cb = bob.commit(rng).unwrap();
        alice.receive_commitment(&cb.to_bytes()).unwrap();
        bob.receive_commitment(&ca.to_bytes()).unwrap();

        let da = alice.decommitment().unwrap().as_bytes().to_vec();
        let db = bob.decommitment().unwrap().as_bytes().to_vec();
        alice.open_peer_commitment(&db).unwrap();
        bob.open_peer_commitment(&da).unwrap();

        (alice, bob)
    }

    #[test]
    fn default_sizes_match_wire_format() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();

        assert_eq!(agreement.build_commitment_message().len(), 35);
        assert_eq!(agreement.commitment_len(), 142);
        assert_eq!(agreement.decommitment_len(), 35);
        assert_eq!(agreement.frame_overhead(), 56);
    }

    #[test]
    fn rejects_non_positive_sizes() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        for bad in [
            KeyAgreementParams { nonce_len: 0, ..params() },
            KeyAgreementParams { iv_len: 0, ..params() },
            KeyAgreementParams { tag_len: 0, ..params() },
        ] {
            assert!(matches!(
                KeyAgreement::initialize(bad, &mut rng),
                Err(CryptoError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn rejects_unsupported_aead_sizes() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let bad = KeyAgreementParams { iv_len: 24, ..params() };
        assert!(matches!(
            KeyAgreement::initialize(bad, &mut rng),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn both_sides_derive_working_channel_and_same_sas() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (alice, bob) = pair(&mut rng);

        let wire = alice.encrypt(b"ping", &mut rng).unwrap();
        assert_eq!(bob.decrypt(&wire).unwrap().as_deref(), Some(&b"ping"[..]));

        assert_eq!(
            alice.verification_nonce().as_bytes(),
            bob.verification_nonce().as_bytes()
        );
    }

    #[test]
    fn encrypt_before_keys_is_illegal() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();

        assert!(matches!(agreement.encrypt(b"x", &mut rng), Err(CryptoError::IllegalState(_))));
        assert!(matches!(agreement.decrypt(&[0u8; 64]), Err(CryptoError::IllegalState(_))));
    }

    #[test]
    fn decommitment_before_commit_is_illegal() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();
        assert!(matches!(agreement.decommitment(), Err(CryptoError::IllegalState(_))));
    }

    #[test]
    fn preshared_secret_keys_both_sides() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut alice = KeyAgreement::initialize(params(), &mut rng).unwrap();
        let mut bob = KeyAgreement::initialize(params(), &mut rng).unwrap();
        alice.set_preshared_secret(&[0x42; 32]).unwrap();
        bob.set_preshared_secret(&[0x42; 32]).unwrap();

        let wire = alice.encrypt(b"hi", &mut rng).unwrap();
        assert_eq!(bob.decrypt(&wire).unwrap().as_deref(), Some(&b"hi"[..]));
        assert!(!alice.verification_nonce().is_merged());
    }

    #[test]
    fn preshared_secret_must_be_32_bytes() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();
        assert!(matches!(
            agreement.set_preshared_secret(&[0u8; 16]),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(!agreement.is_keyed());
    }

    #[test]
    fn tampered_decommitment_leaves_agreement_unkeyed() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let mut alice = KeyAgreement::initialize(params(), &mut rng).unwrap();
        let mut bob = KeyAgreement::initialize(params(), &mut rng).unwrap();

        let cb = bob.commit(&mut rng).unwrap();
        alice.receive_commitment(&cb.to_bytes()).unwrap();

        let mut db = bob.decommitment().unwrap().as_bytes().to_vec();
        db[0] ^= 0x01;
        assert_eq!(alice.open_peer_commitment(&db), Err(CryptoError::CommitmentMismatch));
        assert!(!alice.is_keyed());
        assert!(!alice.verification_nonce().is_merged());
    }

    #[test]
    fn regenerate_replaces_identity() {
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        let mut agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();
        let before = agreement.public_key();
        agreement.commit(&mut rng).unwrap();

        agreement.regenerate(&mut rng).unwrap();

        assert_ne!(agreement.public_key(), before);
        assert!(agreement.decommitment().is_err());
    }

    #[test]
    fn finish_hands_over_channel_and_sas() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (mut alice, mut bob) = pair(&mut rng);
        let alice_key = alice.public_key();

        let (alice_channel, alice_sas) = alice.finish(&mut rng).unwrap();
        let (bob_channel, bob_sas) = bob.finish(&mut rng).unwrap();

        assert!(alice_sas.is_some());
        assert_eq!(alice_sas, bob_sas);
        assert_ne!(alice.public_key(), alice_key);
        assert!(!alice.is_keyed());

        let wire = bob_channel.encrypt(b"after", &mut rng).unwrap();
        assert_eq!(alice_channel.decrypt(&wire).unwrap().as_deref(), Some(&b"after"[..]));
    }

    #[test]
    fn finish_without_keys_is_illegal() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let mut agreement = KeyAgreement::initialize(params(), &mut rng).unwrap();
        assert!(matches!(agreement.finish(&mut rng), Err(CryptoError::IllegalState(_))));
    }
}
