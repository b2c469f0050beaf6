//! Fuzz target for the sync token decoder
//!
//! # Invariants
//!
//! - A decoded token consumes exactly its literal, which prefixes the input
//! - `Ok(None)` only for a strict prefix of some token
//! - Unknown input reports at most `MAX_TOKEN_LEN` bytes
//! - NEVER panic

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_proto::{MAX_TOKEN_LEN, ProtocolError, SyncToken};

fuzz_target!(|data: &[u8]| {
    match SyncToken::decode(data) {
        Ok(Some((token, consumed))) => {
            assert_eq!(consumed, token.as_bytes().len());
            assert!(data.starts_with(token.as_bytes()));
        },
        Ok(None) => {
            assert!(
                data.is_empty()
                    || SyncToken::ALL.iter().any(|t| t.as_bytes().starts_with(data)
                        && t.as_bytes().len() > data.len())
            );
        },
        Err(ProtocolError::UnknownToken(prefix)) => {
            assert!(prefix.len() <= MAX_TOKEN_LEN);
            assert!(data.starts_with(&prefix));
        },
        Err(e) => panic!("unexpected error: {e}"),
    }
});
