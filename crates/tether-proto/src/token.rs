//! Synchronization tokens exchanged before key agreement.
//!
//! Tokens are bare ASCII literals with no delimiter, so the decoder works on
//! a byte buffer and reports how much it consumed.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Longest token on the wire (`Ready`).
pub const MAX_TOKEN_LEN: usize = 5;

/// Handshake synchronization token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncToken {
    /// Sender is ready to pair
    Ready,
    /// Sender saw the peer's `Ready`
    Ack,
    /// Sender is aborting
    Fin,
}

impl SyncToken {
    /// Every token, in decode order.
    pub const ALL: [SyncToken; 3] = [SyncToken::Ready, SyncToken::Ack, SyncToken::Fin];

    /// Wire literal.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Ready => b"Ready",
            Self::Ack => b"ACK",
            Self::Fin => b"FIN",
        }
    }

    /// Decode the token at the start of `buf`.
    ///
    /// Returns `Ok(None)` while `buf` is a strict prefix of some token, and
    /// `Ok(Some((token, consumed)))` once a whole token is present.
    ///
    /// # Errors
    ///
    /// - `UnknownToken` if `buf` cannot begin any token
    pub fn decode(buf: &[u8]) -> Result<Option<(SyncToken, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut partial = false;
        for token in Self::ALL {
            let literal = token.as_bytes();
            if buf.starts_with(literal) {
                return Ok(Some((token, literal.len())));
            }
            partial |= literal.starts_with(buf);
        }

        if partial {
            Ok(None)
        } else {
            Err(ProtocolError::UnknownToken(buf[..buf.len().min(MAX_TOKEN_LEN)].to_vec()))
        }
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "Ready",
            Self::Ack => "ACK",
            Self::Fin => "FIN",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(SyncToken::Ready.as_bytes(), b"Ready");
        assert_eq!(SyncToken::Ack.as_bytes(), b"ACK");
        assert_eq!(SyncToken::Fin.as_bytes(), b"FIN");
    }

    #[test]
    fn whole_tokens_decode() {
        for token in SyncToken::ALL {
            let bytes = token.as_bytes();
            assert_eq!(SyncToken::decode(bytes).unwrap(), Some((token, bytes.len())));
        }
    }

    #[test]
    fn prefixes_need_more() {
        assert_eq!(SyncToken::decode(b"").unwrap(), None);
        assert_eq!(SyncToken::decode(b"R").unwrap(), None);
        assert_eq!(SyncToken::decode(b"Read").unwrap(), None);
        assert_eq!(SyncToken::decode(b"AC").unwrap(), None);
        assert_eq!(SyncToken::decode(b"F").unwrap(), None);
    }

    #[test]
    fn back_to_back_tokens_consume_one() {
        assert_eq!(SyncToken::decode(b"ACKReady").unwrap(), Some((SyncToken::Ack, 3)));
        assert_eq!(SyncToken::decode(b"ReadyACK").unwrap(), Some((SyncToken::Ready, 5)));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(SyncToken::decode(b"X"), Err(ProtocolError::UnknownToken(_))));
        assert!(matches!(SyncToken::decode(b"Rexdy"), Err(ProtocolError::UnknownToken(_))));
        assert!(matches!(SyncToken::decode(b"ACX"), Err(ProtocolError::UnknownToken(_))));
    }

    #[test]
    fn unknown_token_is_truncated() {
        let Err(ProtocolError::UnknownToken(bytes)) = SyncToken::decode(b"garbage bytes") else {
            panic!("expected unknown token");
        };
        assert_eq!(bytes, b"garba");
    }
}
