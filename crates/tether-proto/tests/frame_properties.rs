//! Property-based tests for frame splitting and reassembly.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tether_proto::{Frame, HEADER_SIZE, Reassembler, SyncToken, reassemble, split};

fn roundtrip(payload: &[u8], frame_size: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let frames = split(payload, frame_size, &mut rng).unwrap();
    reassemble(&frames, frame_size).unwrap().to_vec()
}

#[test]
fn helloworld_splits_into_three_frames() {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let frames = split(b"HELLOWORLD", 4, &mut rng).unwrap();

    assert_eq!(frames.len(), 3);

    assert_eq!(frames[0].header().payload_len(), 4);
    assert!(!frames[0].is_last());
    assert_eq!(frames[0].payload(), b"HELL");

    assert_eq!(frames[1].header().payload_len(), 4);
    assert!(!frames[1].is_last());
    assert_eq!(frames[1].payload(), b"OWOR");

    assert_eq!(frames[2].header().payload_len(), 2);
    assert!(frames[2].is_last());
    assert_eq!(frames[2].payload(), b"LD");

    let wire = frames[2].encode();
    assert_eq!(wire.len(), HEADER_SIZE + 4);
    assert_eq!(&wire[..4], &[0x02, 0x80, b'L', b'D']);

    assert_eq!(&reassemble(&frames, 4).unwrap()[..], b"HELLOWORLD");
}

#[test]
fn boundary_lengths_roundtrip() {
    for frame_size in [1usize, 4, 16, 1024] {
        let mut lengths = vec![0, 1, frame_size - 1, frame_size, frame_size + 1];
        lengths.extend((2..5).map(|k| k * frame_size));

        for (i, len) in lengths.into_iter().enumerate() {
            let payload: Vec<u8> = (0..len).map(|b| (b % 251) as u8).collect();
            assert_eq!(roundtrip(&payload, frame_size, i as u64), payload, "len {len} fs {frame_size}");
        }
    }
}

#[test]
fn padding_differs_between_splits() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let a = split(b"x", 64, &mut rng).unwrap();
    let b = split(b"x", 64, &mut rng).unwrap();

    assert_eq!(a[0].payload(), b[0].payload());
    assert_ne!(a[0].encode(), b[0].encode());
}

#[test]
fn back_to_back_messages_reassemble_separately() {
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let mut wire = Vec::new();
    for message in [&b"first message"[..], b"", b"third"] {
        for frame in split(message, 5, &mut rng).unwrap() {
            wire.push(frame.encode());
        }
    }

    let mut reassembler = Reassembler::new(5, 1024).unwrap();
    let messages: Vec<_> =
        wire.iter().filter_map(|bytes| reassembler.push_encoded(bytes).unwrap()).collect();

    assert_eq!(messages.len(), 3);
    assert_eq!(&messages[0][..], b"first message");
    assert_eq!(&messages[1][..], b"");
    assert_eq!(&messages[2][..], b"third");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_split_reassemble_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..4096),
        frame_size in 1usize..600,
        seed in any::<u64>(),
    ) {
        // PROPERTY: reassemble(split(x)) == x
        prop_assert_eq!(roundtrip(&payload, frame_size, seed), payload);
    }

    #[test]
    fn prop_frame_count_and_size_fixed(
        len in 0usize..4096,
        frame_size in 1usize..600,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(len as u64);
        let frames = split(&vec![0xAB; len], frame_size, &mut rng).unwrap();

        // PROPERTY: always one trailing frame, every frame the same size
        prop_assert_eq!(frames.len(), len / frame_size + 1);
        prop_assert!(frames.iter().all(|f| f.encoded_len() == HEADER_SIZE + frame_size));
        prop_assert_eq!(frames.iter().filter(|f| f.is_last()).count(), 1);
        prop_assert!(frames.last().is_some_and(Frame::is_last));
    }

    #[test]
    fn prop_decode_never_panics(
        bytes in prop::collection::vec(any::<u8>(), 0..64),
        frame_size in 1usize..64,
    ) {
        // PROPERTY: arbitrary bytes decode or fail cleanly
        if let Ok(frame) = Frame::decode(&bytes, frame_size) {
            prop_assert!(frame.payload().len() <= frame_size);
        }
    }

    #[test]
    fn prop_token_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..16)) {
        // PROPERTY: consumed never exceeds input
        if let Ok(Some((token, consumed))) = SyncToken::decode(&bytes) {
            prop_assert!(consumed <= bytes.len());
            prop_assert_eq!(&bytes[..consumed], token.as_bytes());
        }
    }
}
