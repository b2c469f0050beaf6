//! Property-based tests for the commitment scheme.
//!
//! Correctness: a genuine (commitment, decommitment) pair opens to exactly the
//! committed message. Binding: any other decommitment fails with the same
//! opaque mismatch error.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_crypto::{Commitment, CommitmentScheme, CryptoError, SlowHashParams};

/// Strategy for committed messages (lengths 1..64)
fn message() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

fn scheme(len: usize) -> CommitmentScheme {
    CommitmentScheme::new(len, SlowHashParams::MINIMAL).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_open_recovers_message(message in message(), seed in any::<u64>()) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (commitment, decommitment) = scheme(message.len()).commit(&message, &mut rng).unwrap();

        let mut receiver = scheme(message.len());
        receiver.receive_commitment(&commitment.to_bytes()).unwrap();
        let opened = receiver.open(decommitment.as_bytes()).unwrap();

        // PROPERTY: correctness
        prop_assert_eq!(&opened[..], &message[..]);
    }

    #[test]
    fn prop_single_byte_perturbation_fails(
        message in message(),
        seed in any::<u64>(),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (commitment, decommitment) = scheme(message.len()).commit(&message, &mut rng).unwrap();

        let mut forged = decommitment.as_bytes().to_vec();
        let i = position.index(forged.len());
        forged[i] ^= flip;

        let mut receiver = scheme(message.len());
        receiver.receive_commitment(&commitment.to_bytes()).unwrap();

        // PROPERTY: binding
        prop_assert_eq!(receiver.open(&forged), Err(CryptoError::CommitmentMismatch));
    }

    #[test]
    fn prop_unrelated_decommitment_fails(message in message(), seed in any::<u64>()) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (commitment, _) = scheme(message.len()).commit(&message, &mut rng).unwrap();
        let (_, other) = scheme(message.len()).commit(&message, &mut rng).unwrap();

        let mut receiver = scheme(message.len());
        receiver.receive_commitment(&commitment.to_bytes()).unwrap();

        prop_assert_eq!(receiver.open(other.as_bytes()), Err(CryptoError::CommitmentMismatch));
    }

    #[test]
    fn prop_encoded_length_is_fixed(message in message(), seed in any::<u64>()) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (commitment, decommitment) = scheme(message.len()).commit(&message, &mut rng).unwrap();

        prop_assert_eq!(commitment.to_bytes().len(), Commitment::encoded_len(message.len()));
        prop_assert_eq!(decommitment.len(), message.len());
    }
}

#[test]
fn multi_byte_perturbations_fail() {
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let message = [0x17u8; 35];
    let (commitment, decommitment) = scheme(35).commit(&message, &mut rng).unwrap();

    let perturbations: [&dyn Fn(&mut Vec<u8>); 4] = [
        &|x: &mut Vec<u8>| x.iter_mut().for_each(|b| *b ^= 0xFF),
        &|x: &mut Vec<u8>| x.reverse(),
        &|x: &mut Vec<u8>| x.rotate_left(1),
        &|x: &mut Vec<u8>| {
            x[0] = x[0].wrapping_add(1);
            x[34] = x[34].wrapping_sub(1);
        },
    ];

    for perturb in perturbations {
        let mut forged = decommitment.as_bytes().to_vec();
        perturb(&mut forged);
        if forged == decommitment.as_bytes() {
            continue;
        }

        let mut receiver = scheme(35);
        receiver.receive_commitment(&commitment.to_bytes()).unwrap();
        assert_eq!(receiver.open(&forged), Err(CryptoError::CommitmentMismatch));
    }
}

#[test]
fn mismatched_cost_fails_to_open() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let (commitment, decommitment) = scheme(8).commit(&[3u8; 8], &mut rng).unwrap();

    let mut receiver =
        CommitmentScheme::new(8, SlowHashParams { memory_kib: 16, iterations: 1 }).unwrap();
    receiver.receive_commitment(&commitment.to_bytes()).unwrap();

    assert_eq!(receiver.open(decommitment.as_bytes()), Err(CryptoError::CommitmentMismatch));
}
