//! Error types for the cryptographic layer.

use thiserror::Error;

/// Errors from commitment, key agreement and channel operations.
///
/// Authentication tag failures on decrypt are deliberately absent: they are
/// an expected outcome under corruption or probing and surface as `Ok(None)`
/// from [`crate::SecureChannel::decrypt`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed size, buffer or unsupported parameter. Caller bug.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation called out of sequence (e.g. encrypt before keys exist).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The revealed decommitment does not open the stored commitment.
    ///
    /// Carries no detail on purpose: the caller must not learn whether the
    /// MAC or the slow hash check failed.
    #[error("commitment mismatch")]
    CommitmentMismatch,
}

impl CryptoError {
    /// Returns true if this error may indicate an active attacker.
    ///
    /// Sessions that hit such an error must discard their identity before
    /// retrying.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::CommitmentMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mismatch_is_suspicious() {
        assert!(CryptoError::CommitmentMismatch.is_suspicious());
        assert!(!CryptoError::InvalidArgument("x".to_string()).is_suspicious());
        assert!(!CryptoError::IllegalState("x".to_string()).is_suspicious());
    }

    #[test]
    fn mismatch_display_reveals_nothing() {
        assert_eq!(CryptoError::CommitmentMismatch.to_string(), "commitment mismatch");
    }
}
