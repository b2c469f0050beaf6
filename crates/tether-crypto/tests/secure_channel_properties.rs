//! Property-based tests for the double-AEAD channel and SAS merging.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_crypto::{FRAME_OVERHEAD, SecureChannel, VerificationNonce};

fn channel(secret: [u8; 32]) -> SecureChannel {
    SecureChannel::from_secret(&secret).unwrap()
}

proptest! {
    #[test]
    fn prop_encrypt_decrypt_roundtrip(
        secret in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let channel = channel(secret);

        let wire = channel.encrypt(&plaintext, &mut rng).unwrap();

        // PROPERTY: fixed expansion and identity round trip
        prop_assert_eq!(wire.len(), plaintext.len() + FRAME_OVERHEAD);
        prop_assert_eq!(channel.decrypt(&wire).unwrap(), Some(plaintext));
    }

    #[test]
    fn prop_any_bit_flip_yields_no_data(
        secret in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        seed in any::<u64>(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let channel = channel(secret);

        let mut wire = channel.encrypt(&plaintext, &mut rng).unwrap();
        let i = position.index(wire.len());
        wire[i] ^= 1 << bit;

        // PROPERTY: tamper anywhere (IVs included) is detected, never a crash
        prop_assert_eq!(channel.decrypt(&wire).unwrap(), None);
    }

    #[test]
    fn prop_truncation_never_panics(
        secret in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..64),
        cut in 1usize..64,
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let channel = channel(secret);

        let wire = channel.encrypt(&plaintext, &mut rng).unwrap();
        let truncated = &wire[..wire.len().saturating_sub(cut)];

        match channel.decrypt(truncated) {
            Ok(result) => prop_assert_eq!(result, None),
            Err(_) => prop_assert!(truncated.len() < FRAME_OVERHEAD),
        }
    }

    #[test]
    fn prop_sas_merge_is_symmetric(len in 1usize..16, seed_a in any::<u64>(), seed_b in any::<u64>()) {
        let mut a = VerificationNonce::generate(len, &mut ChaCha20Rng::seed_from_u64(seed_a)).unwrap();
        let mut b = VerificationNonce::generate(len, &mut ChaCha20Rng::seed_from_u64(seed_b)).unwrap();
        let a_bytes = a.as_bytes().to_vec();
        let b_bytes = b.as_bytes().to_vec();

        a.merge(&b_bytes).unwrap();
        b.merge(&a_bytes).unwrap();

        // PROPERTY: XOR commutes, both users see the same code
        prop_assert_eq!(a.sas().unwrap(), b.sas().unwrap());
        prop_assert!(a.merge(&b_bytes).is_err());
    }
}
