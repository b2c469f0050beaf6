//! Fuzz target for double-layer decryption
//!
//! # Invariants
//!
//! - Short input is `InvalidArgument`, anything else decrypts or yields `None`
//! - A single flipped bit anywhere in a real ciphertext yields `None`
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_crypto::{CryptoError, FRAME_OVERHEAD, SecureChannel};

#[derive(Debug, Clone, Arbitrary)]
struct Input {
    secret: [u8; 32],
    plaintext: Vec<u8>,
    garbage: Vec<u8>,
    bit: u32,
    seed: u64,
}

fuzz_target!(|input: Input| {
    let channel = SecureChannel::from_secret(&input.secret).unwrap();

    match channel.decrypt(&input.garbage) {
        Err(CryptoError::InvalidArgument(_)) => assert!(input.garbage.len() < FRAME_OVERHEAD),
        Ok(_) => assert!(input.garbage.len() >= FRAME_OVERHEAD),
        Err(e) => panic!("unexpected error: {e}"),
    }

    let mut rng = ChaCha20Rng::seed_from_u64(input.seed);
    let mut wire = channel.encrypt(&input.plaintext, &mut rng).unwrap();
    assert_eq!(channel.decrypt(&wire).unwrap().as_deref(), Some(&input.plaintext[..]));

    let bit = input.bit as usize % (wire.len() * 8);
    wire[bit / 8] ^= 1 << (bit % 8);
    assert_eq!(channel.decrypt(&wire).unwrap(), None);
});
