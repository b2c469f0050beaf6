//! Fixed-width modular arithmetic for commitment masking.
//!
//! All operands are big-endian unsigned integers of the same byte length `n`,
//! and every result is reduced modulo `2^(8n)` by truncation. Loop bounds
//! depend only on `n`, never on operand values, so timing and memory use are
//! independent of the secrets being masked.

use zeroize::Zeroizing;

/// Little-endian digit `k` of a big-endian byte string.
#[inline]
fn digit(bytes: &[u8], k: usize) -> u64 {
    u64::from(bytes[bytes.len() - 1 - k])
}

/// `a * b mod 2^(8n)`.
pub(crate) fn mul_mod(a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();

    // Column sums of the truncated schoolbook product. Each partial product is
    // below 2^16 and a column has at most n of them, so u64 never overflows.
    let mut columns = Zeroizing::new(vec![0u64; n]);
    for i in 0..n {
        for j in 0..n - i {
            columns[i + j] += digit(a, i) * digit(b, j);
        }
    }

    let mut out = Zeroizing::new(vec![0u8; n]);
    let mut carry = 0u64;
    for k in 0..n {
        let value = columns[k] + carry;
        out[n - 1 - k] = value as u8;
        carry = value >> 8;
    }

    out
}

/// `a + b mod 2^(8n)`.
pub(crate) fn add_mod(a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();

    let mut out = Zeroizing::new(vec![0u8; n]);
    let mut carry = 0u16;
    for k in (0..n).rev() {
        let sum = u16::from(a[k]) + u16::from(b[k]) + carry;
        out[k] = sum as u8;
        carry = sum >> 8;
    }

    out
}

/// `a - b mod 2^(8n)`.
pub(crate) fn sub_mod(a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();

    let mut out = Zeroizing::new(vec![0u8; n]);
    let mut borrow = 0u16;
    for k in (0..n).rev() {
        // Wraps past 0xFF00 exactly when the digit goes negative
        let diff = u16::from(a[k]).wrapping_sub(u16::from(b[k])).wrapping_sub(borrow);
        out[k] = diff as u8;
        borrow = (diff >> 15) & 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn to_u64(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    fn from_u64(value: u64, n: usize) -> Vec<u8> {
        value.to_be_bytes()[8 - n..].to_vec()
    }

    #[test]
    fn single_byte_wraps() {
        assert_eq!(*mul_mod(&[0x10], &[0x10]), vec![0x00]);
        assert_eq!(*add_mod(&[0xFF], &[0x02]), vec![0x01]);
        assert_eq!(*sub_mod(&[0x00], &[0x01]), vec![0xFF]);
    }

    #[test]
    fn carries_propagate_across_bytes() {
        assert_eq!(*add_mod(&[0x00, 0xFF, 0xFF], &[0x00, 0x00, 0x01]), vec![0x01, 0x00, 0x00]);
        assert_eq!(*sub_mod(&[0x01, 0x00, 0x00], &[0x00, 0x00, 0x01]), vec![0x00, 0xFF, 0xFF]);
        assert_eq!(*mul_mod(&[0x00, 0x01, 0x00], &[0x00, 0x01, 0x00]), vec![0x01, 0x00, 0x00]);
    }

    #[test]
    fn product_truncates_high_limbs() {
        // 0x0100 * 0x0100 = 0x010000, which does not fit in two bytes
        assert_eq!(*mul_mod(&[0x01, 0x00], &[0x01, 0x00]), vec![0x00, 0x00]);
    }

    proptest! {
        #[test]
        fn matches_native_wrapping_arithmetic(a in any::<u64>(), b in any::<u64>(), n in 1usize..=8) {
            let mask = if n == 8 { u64::MAX } else { (1u64 << (8 * n)) - 1 };
            let (a, b) = (a & mask, b & mask);
            let (ab, bb) = (from_u64(a, n), from_u64(b, n));

            prop_assert_eq!(to_u64(&mul_mod(&ab, &bb)), a.wrapping_mul(b) & mask);
            prop_assert_eq!(to_u64(&add_mod(&ab, &bb)), a.wrapping_add(b) & mask);
            prop_assert_eq!(to_u64(&sub_mod(&ab, &bb)), a.wrapping_sub(b) & mask);
        }

        #[test]
        fn masking_inverts(
            (m, a, x) in (1usize..64).prop_flat_map(|n| (
                prop::collection::vec(any::<u8>(), n),
                prop::collection::vec(any::<u8>(), n),
                prop::collection::vec(any::<u8>(), n),
            ))
        ) {
            let product = mul_mod(&a, &x);
            let masked = sub_mod(&m, &product);
            prop_assert_eq!(&*add_mod(&masked, &product), &m);
        }
    }
}
