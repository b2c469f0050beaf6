//! Fuzz target for opening attacker-supplied commitments
//!
//! # Strategy
//!
//! - Random: arbitrary commitment and decommitment bytes
//! - Bit flip: an honest peer's messages with one bit flipped
//! - Swap: a decommitment for a different commitment
//!
//! # Invariants
//!
//! - Only the honest, untouched pair opens and keys the agreement
//! - Any tampering yields an error and leaves the agreement unkeyed
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_crypto::{KeyAgreement, KeyAgreementParams, SlowHashParams};

#[derive(Debug, Clone, Arbitrary)]
enum Attack {
    Random { commitment: Vec<u8>, decommitment: Vec<u8> },
    FlipCommitment { bit: u16 },
    FlipDecommitment { bit: u16 },
    Swap,
    Honest,
}

fn params() -> KeyAgreementParams {
    KeyAgreementParams { slow_hash: SlowHashParams::MINIMAL, ..KeyAgreementParams::default() }
}

fn flip(bytes: &mut [u8], bit: u16) {
    let bit = usize::from(bit) % (bytes.len() * 8);
    bytes[bit / 8] ^= 1 << (bit % 8);
}

fuzz_target!(|input: (u64, Attack)| {
    let (seed, attack) = input;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let mut victim = KeyAgreement::initialize(params(), &mut rng).unwrap();
    let mut peer = KeyAgreement::initialize(params(), &mut rng).unwrap();
    let mut other = KeyAgreement::initialize(params(), &mut rng).unwrap();

    let mut commitment = peer.commit(&mut rng).unwrap().to_bytes();
    let mut decommitment = peer.decommitment().unwrap().as_bytes().to_vec();
    other.commit(&mut rng).unwrap();

    let honest = matches!(attack, Attack::Honest);
    match attack {
        Attack::Random { commitment: c, decommitment: d } => {
            commitment = c;
            decommitment = d;
        },
        Attack::FlipCommitment { bit } => flip(&mut commitment, bit),
        Attack::FlipDecommitment { bit } => flip(&mut decommitment, bit),
        Attack::Swap => decommitment = other.decommitment().unwrap().as_bytes().to_vec(),
        Attack::Honest => {},
    }

    let opened = victim
        .receive_commitment(&commitment)
        .and_then(|()| victim.open_peer_commitment(&decommitment));

    assert_eq!(opened.is_ok(), honest);
    assert_eq!(victim.is_keyed(), honest);
});
