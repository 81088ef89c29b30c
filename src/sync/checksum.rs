//! Checksum primitives for block matching
//!
//! The weak checksum is the rsync rolling checksum: two 16-bit sums packed
//! into a `u32`. The strong checksum is Blake3 truncated to 128 bits and is
//! only consulted once a weak checksum has already matched.

/// Length in bytes of a strong checksum
pub const STRONG_CHECKSUM_LEN: usize = 16;

/// Strong (cryptographic) checksum of a block
pub type StrongChecksum = [u8; STRONG_CHECKSUM_LEN];

const MASK: u32 = 0xFFFF;

/// Sum of the unsigned byte values, mod 2^16
pub fn a(block: &[u8]) -> u32 {
    block
        .iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(byte as u32))
        & MASK
}

/// Position-weighted sum `Σ (l - i + 1) * x_i` over `i in [k, l]`, mod 2^16
///
/// `block[0]` is taken to sit at position `k`.
pub fn b(block: &[u8], k: u64, l: u64) -> u32 {
    let mut sum = 0u32;
    for (offset, &byte) in block.iter().enumerate() {
        let weight = l.wrapping_sub(k + offset as u64).wrapping_add(1) as u32;
        sum = sum.wrapping_add(weight.wrapping_mul(byte as u32));
    }
    sum & MASK
}

/// Pack the two partial sums into one weak checksum: `a + (b << 16)`
pub fn combine(a: u32, b: u32) -> u32 {
    (a & MASK) | ((b & MASK) << 16)
}

/// Weak checksum of the block spanning positions `[k, l]`
pub fn weak_checksum(block: &[u8], k: u64, l: u64) -> u32 {
    combine(a(block), b(block, k, l))
}

/// Weak checksum of a standalone block
pub fn block_checksum(block: &[u8]) -> u32 {
    if block.is_empty() {
        return 0;
    }
    weak_checksum(block, 0, block.len() as u64 - 1)
}

/// Strong checksum (Blake3, truncated to 128 bits)
pub fn strong_checksum(block: &[u8]) -> StrongChecksum {
    truncate(blake3::hash(block))
}

pub(crate) fn truncate(hash: blake3::Hash) -> StrongChecksum {
    let mut strong = [0u8; STRONG_CHECKSUM_LEN];
    strong.copy_from_slice(&hash.as_bytes()[..STRONG_CHECKSUM_LEN]);
    strong
}
