//! Fuzz target for frame decoding and message reassembly
//!
//! # Strategy
//!
//! - Split: arbitrary payloads at arbitrary frame sizes, then reassemble
//! - Raw: attacker-chosen wire frames pushed straight into a reassembler
//! - Truncated: valid frames cut short or padded
//!
//! # Invariants
//!
//! - `split` then `reassemble` returns the original payload
//! - Every split yields `len / fs + 1` frames, only the final one marked last
//! - A completed message never exceeds the reassembler's limit
//! - After an error nothing completes until a last-flagged frame is skipped
//! - Wrong-length input is `SizeMismatch`, never a panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_proto::{HEADER_SIZE, ProtocolError, Reassembler, reassemble, split};

const MAX_MESSAGE: usize = 4096;

#[derive(Debug, Clone, Arbitrary)]
enum Scenario {
    Split { frame_size: u8, payload: Vec<u8>, seed: u64 },
    Raw { frame_size: u8, frames: Vec<Vec<u8>> },
    Truncated { frame_size: u8, payload: Vec<u8>, cut: u8, extend: bool },
}

fn frame_size(raw: u8) -> usize {
    usize::from(raw).max(1)
}

fuzz_target!(|scenario: Scenario| {
    match scenario {
        Scenario::Split { frame_size: raw, payload, seed } => {
            let fs = frame_size(raw);
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let frames = split(&payload, fs, &mut rng).unwrap();

            assert_eq!(frames.len(), payload.len() / fs + 1);
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame.is_last(), i + 1 == frames.len());
                assert_eq!(frame.encode().len(), HEADER_SIZE + fs);
            }

            let message = reassemble(&frames, fs).unwrap();
            assert_eq!(&message[..], &payload[..]);
        },
        Scenario::Raw { frame_size: raw, frames } => {
            let fs = frame_size(raw);
            let mut reassembler = Reassembler::new(fs, MAX_MESSAGE).unwrap();

            for wire in &frames {
                let skipping = reassembler.is_discarding();
                match reassembler.push_encoded(wire) {
                    Ok(Some(message)) => {
                        assert!(!skipping);
                        assert!(message.len() <= MAX_MESSAGE);
                    },
                    Ok(None) => assert!(skipping || reassembler.has_partial()),
                    Err(ProtocolError::SizeMismatch(_)) => {
                        assert!(wire.len() != HEADER_SIZE + fs || declared_len(wire) > fs);
                    },
                    Err(ProtocolError::MessageTooLarge { size, max }) => {
                        assert!(size > max);
                        assert!(!reassembler.has_partial());
                    },
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        },
        Scenario::Truncated { frame_size: raw, payload, cut, extend } => {
            let fs = frame_size(raw);
            let mut rng = ChaCha20Rng::seed_from_u64(u64::from(cut));
            let frames = split(&payload, fs, &mut rng).unwrap();
            let mut reassembler = Reassembler::new(fs, usize::MAX).unwrap();

            let mut wire = frames[0].encode().to_vec();
            if extend {
                wire.push(cut);
            } else {
                wire.truncate(wire.len().saturating_sub(usize::from(cut).max(1)));
            }

            assert!(matches!(reassembler.push_encoded(&wire), Err(ProtocolError::SizeMismatch(_))));
        },
    }
});

fn declared_len(wire: &[u8]) -> usize {
    match wire {
        [lo, hi, ..] => usize::from(*lo) | (usize::from(*hi & 0x7F) << 8),
        _ => 0,
    }
}
