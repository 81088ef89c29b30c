use crate::sync::checksum::StrongChecksum;
use crate::sync::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Smallest block size picked by the heuristic
pub const MIN_BLOCK_SIZE: usize = 512;

/// Default buffer size for file and channel I/O
pub const DEFAULT_IO_BUFFER_SIZE: usize = 32 * 1024;

/// Block size heuristic: `max(file_len / 1000, 512)`
pub fn default_block_size(file_len: u64) -> usize {
    let scaled = usize::try_from(file_len / 1000).unwrap_or(i32::MAX as usize);
    scaled.clamp(MIN_BLOCK_SIZE, i32::MAX as usize)
}

/// Reject block sizes that cannot be carried on the wire
pub fn validate_block_size(block_size: i64) -> SyncResult<usize> {
    if block_size <= 0 || block_size > i32::MAX as i64 {
        return Err(SyncError::InvalidBlockSize(block_size));
    }
    Ok(block_size as usize)
}

/// Per-block checksums of the receiver's file, index-aligned with block order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    block_size: usize,
    weak: Vec<u32>,
    strong: Vec<StrongChecksum>,
}

impl ChecksumSet {
    pub fn new(
        block_size: usize,
        weak: Vec<u32>,
        strong: Vec<StrongChecksum>,
    ) -> SyncResult<Self> {
        validate_block_size(block_size as i64)?;
        if weak.len() != strong.len() {
            return Err(SyncError::protocol(format!(
                "checksum lists differ in length: {} weak, {} strong",
                weak.len(),
                strong.len()
            )));
        }
        Ok(Self {
            block_size,
            weak,
            strong,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.weak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weak.is_empty()
    }

    pub fn weak_checksums(&self) -> &[u32] {
        &self.weak
    }

    pub fn strong_checksums(&self) -> &[StrongChecksum] {
        &self.strong
    }

    /// `(weak, strong)` pairs in block order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &StrongChecksum)> + '_ {
        self.weak.iter().copied().zip(self.strong.iter())
    }

    /// Size of this set on the byte-stream wire
    pub fn wire_size(&self) -> u64 {
        8 + 24 * self.block_count() as u64
    }
}

/// Header of one unit of the sender-to-receiver instruction stream
///
/// The literal bytes themselves are not carried here: they follow the header
/// on the channel and are streamed straight to their destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferItem {
    /// `literal_len` bytes of literal data, then a copy of receiver block `block` if present
    Data { literal_len: u64, block: Option<u32> },
    /// End of stream; nothing follows
    Terminal,
}

impl TransferItem {
    /// Wire sentinel for "no block" and for the terminal literal count
    pub const SENTINEL: i64 = -1;

    pub fn literal(literal_len: u64) -> Self {
        TransferItem::Data {
            literal_len,
            block: None,
        }
    }

    pub fn block(literal_len: u64, block: u32) -> Self {
        TransferItem::Data {
            literal_len,
            block: Some(block),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferItem::Terminal)
    }

    /// Literal byte count, `-1` for the terminal item
    pub fn literal_len(&self) -> i64 {
        match self {
            TransferItem::Data { literal_len, .. } => *literal_len as i64,
            TransferItem::Terminal => Self::SENTINEL,
        }
    }

    /// Referenced block index, `-1` when absent
    pub fn block_index(&self) -> i64 {
        match self {
            TransferItem::Data {
                block: Some(index), ..
            } => *index as i64,
            _ => Self::SENTINEL,
        }
    }
}

/// Tuning knobs shared by both roles
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Receiver block size; `None` picks [`default_block_size`]
    pub block_size: Option<usize>,
    /// Exchange checksums and gather statistics without writing anything
    pub dry_run: bool,
    pub io_buffer_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            block_size: None,
            dry_run: false,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
        }
    }
}

/// Which side of the protocol produced a [`SyncStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRole {
    Sender,
    Receiver,
}

impl SyncRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRole::Sender => "sender",
            SyncRole::Receiver => "receiver",
        }
    }
}

/// Counters for one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    pub file_name: String,
    pub role: SyncRole,
    pub block_size: usize,
    pub block_count: usize,
    /// Confirmed block matches (sender) or applied block copies (receiver)
    pub match_count: u64,
    /// Window lookups that hit a weak-checksum bucket
    pub weak_match_count: u64,
    /// Contiguous runs of byte-wise rescanning
    pub miss_count: u64,
    /// Literal bytes sent (sender) or checksum-set bytes sent (receiver)
    pub bytes_transferred: u64,
    /// Literal bytes received; receiver only
    pub literal_bytes_received: u64,
    pub duration_millis: u64,
}

impl SyncStats {
    pub fn new(file_name: impl Into<String>, role: SyncRole) -> Self {
        Self {
            file_name: file_name.into(),
            role,
            block_size: 0,
            block_count: 0,
            match_count: 0,
            weak_match_count: 0,
            miss_count: 0,
            bytes_transferred: 0,
            literal_bytes_received: 0,
            duration_millis: 0,
        }
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.duration_millis = elapsed.as_millis() as u64;
    }

    /// Share of blocks the sender could reference instead of sending
    pub fn match_ratio(&self) -> f64 {
        if self.block_count == 0 {
            return 0.0;
        }
        self.match_count as f64 / self.block_count as f64 * 100.0
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({}): {}ms, transferred: {}, block size: {}, blocks: {}, matches: {} ({:.1}%), weak matches: {}, misses: {}",
            self.file_name,
            self.role.as_str(),
            self.duration_millis,
            self.bytes_transferred,
            self.block_size,
            self.block_count,
            self.match_count,
            self.match_ratio(),
            self.weak_match_count,
            self.miss_count
        )
    }
}
