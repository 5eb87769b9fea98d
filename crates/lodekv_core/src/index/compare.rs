//! Byte comparison helpers used on the trie's hot paths.
//!
//! Prefix lengths are computed 16 bytes at a time by XOR-ing little-endian
//! `u128` words, falling back to 8-byte words and then single bytes for the
//! tail.

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET: u32 = 2_166_136_261;
/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a hash of `bytes`.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// Length of the longest common prefix of `a` and `b`.
#[must_use]
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    let mut i = 0;

    for (x, y) in a.chunks_exact(16).zip(b.chunks_exact(16)) {
        let diff = word128(x) ^ word128(y);
        if diff != 0 {
            return i + (diff.trailing_zeros() / 8) as usize;
        }
        i += 16;
    }

    if n - i >= 8 {
        let diff = word64(&a[i..i + 8]) ^ word64(&b[i..i + 8]);
        if diff != 0 {
            return i + (diff.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }

    i + a[i..].iter().zip(&b[i..]).take_while(|(x, y)| x == y).count()
}

/// Byte-wise equality using the same word-at-a-time comparison.
#[must_use]
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && common_prefix_len(a, b) == a.len()
}

fn word128(chunk: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(chunk);
    u128::from_le_bytes(buf)
}

fn word64(chunk: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(chunk);
    u64::from_le_bytes(buf)
}
