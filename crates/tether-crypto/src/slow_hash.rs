//! Salted slow hash binding a committer to its decommitment key.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;

/// Output length of the slow hash (`H` in the commitment).
pub const HASH_SIZE: usize = 24;

/// Salt length of the slow hash.
pub const SALT_SIZE: usize = 16;

/// Default Argon2 memory cost in KiB.
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;

/// Default Argon2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 2;

/// Argon2id cost parameters.
///
/// Both peers must agree on these: the verifier recomputes `H` with its own
/// parameters, so a mismatch fails every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlowHashParams {
    /// Memory cost in KiB (at least 8).
    pub memory_kib: u32,
    /// Number of passes over memory (at least 1).
    pub iterations: u32,
}

impl SlowHashParams {
    /// Cheapest parameters Argon2 accepts. Only for tests and fuzzing.
    pub const MINIMAL: Self = Self { memory_kib: 8, iterations: 1 };

    fn argon2(&self) -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(self.memory_kib, self.iterations, 1, Some(HASH_SIZE))
            .map_err(|e| CryptoError::InvalidArgument(format!("slow hash params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Check the parameters without hashing anything.
    pub fn validate(&self) -> Result<(), CryptoError> {
        self.argon2().map(|_| ())
    }
}

impl Default for SlowHashParams {
    fn default() -> Self {
        Self { memory_kib: DEFAULT_MEMORY_KIB, iterations: DEFAULT_ITERATIONS }
    }
}

/// Compute `H = SlowHash(key, salt, cost)`.
pub(crate) fn slow_hash(
    key: &[u8],
    salt: &[u8; SALT_SIZE],
    params: SlowHashParams,
) -> Result<[u8; HASH_SIZE], CryptoError> {
    let mut out = [0u8; HASH_SIZE];
    params
        .argon2()?
        .hash_password_into(key, salt, &mut out)
        .map_err(|e| CryptoError::InvalidArgument(format!("slow hash: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = [7u8; SALT_SIZE];
        let a = slow_hash(b"key", &salt, SlowHashParams::MINIMAL).unwrap();
        let b = slow_hash(b"key", &salt, SlowHashParams::MINIMAL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_changes_output() {
        let a = slow_hash(b"key", &[0u8; SALT_SIZE], SlowHashParams::MINIMAL).unwrap();
        let b = slow_hash(b"key", &[1u8; SALT_SIZE], SlowHashParams::MINIMAL).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cost_changes_output() {
        let salt = [0u8; SALT_SIZE];
        let cheap = slow_hash(b"key", &salt, SlowHashParams::MINIMAL).unwrap();
        let dearer =
            slow_hash(b"key", &salt, SlowHashParams { memory_kib: 16, iterations: 2 }).unwrap();
        assert_ne!(cheap, dearer);
    }

    #[test]
    fn rejects_too_little_memory() {
        let params = SlowHashParams { memory_kib: 1, iterations: 1 };
        assert!(matches!(params.validate(), Err(CryptoError::InvalidArgument(_))));
    }
}
