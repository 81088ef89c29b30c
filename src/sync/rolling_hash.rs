//! Rolling weak checksum over a fixed-size window
//!
//! Lets the sender compute the weak checksum of every byte-aligned window
//! in O(1) per byte instead of rehashing the whole window.

use crate::sync::checksum::{self, StrongChecksum};

/// Incremental rsync checksum over the window `[k, l]`
///
/// Keeps a circular copy of the window bytes so the byte leaving the window
/// (`x_k`) is always at hand and the window can be strongly hashed in place.
#[derive(Debug, Clone)]
pub struct RollingChecksum {
    a: u32,
    b: u32,
    k: u64,
    window: Vec<u8>,
    /// Index in `window` of the byte at position `k`
    head: usize,
}

impl RollingChecksum {
    /// Start rolling over the first window of a file (positions `[0, len-1]`)
    pub fn new(block: &[u8]) -> Self {
        let mut rolling = Self {
            a: 0,
            b: 0,
            k: 0,
            window: Vec::with_capacity(block.len()),
            head: 0,
        };
        rolling.reset(block, 0);
        rolling
    }

    /// Recompute the sums directly from a full window starting at position `k`
    ///
    /// O(window) - used at scan start and after every confirmed match.
    pub fn reset(&mut self, block: &[u8], k: u64) -> u32 {
        self.window.clear();
        self.window.extend_from_slice(block);
        self.head = 0;
        self.k = k;
        self.a = checksum::a(block);
        self.b = checksum::b(block, k, self.end());
        self.digest()
    }

    /// Slide the window forward by one byte
    ///
    /// `a' = a - x_k + x_{l+1}`, `b' = b - (l - k + 1) * x_k + a'`, both mod 2^16.
    pub fn roll(&mut self, next: u8) -> u32 {
        let len = self.window.len();
        if len == 0 {
            return self.digest();
        }
        let expelled = self.window[self.head] as u32;

        self.a = self
            .a
            .wrapping_sub(expelled)
            .wrapping_add(next as u32)
            & 0xFFFF;
        self.b = self
            .b
            .wrapping_sub((len as u32).wrapping_mul(expelled))
            .wrapping_add(self.a)
            & 0xFFFF;

        self.window[self.head] = next;
        self.head = (self.head + 1) % len;
        self.k += 1;
        self.digest()
    }

    /// Current weak checksum
    pub fn digest(&self) -> u32 {
        checksum::combine(self.a, self.b)
    }

    /// Position of the first byte in the window
    pub fn start(&self) -> u64 {
        self.k
    }

    /// Position of the last byte in the window (inclusive)
    pub fn end(&self) -> u64 {
        (self.k + self.window.len() as u64).saturating_sub(1)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Window bytes in file order, as two slices of the circular buffer
    pub fn window(&self) -> (&[u8], &[u8]) {
        (&self.window[self.head..], &self.window[..self.head])
    }

    /// Strong checksum of the current window
    pub fn strong_checksum(&self) -> StrongChecksum {
        let (front, back) = self.window();
        let mut hasher = blake3::Hasher::new();
        hasher.update(front);
        hasher.update(back);
        checksum::truncate(hasher.finalize())
    }
}
