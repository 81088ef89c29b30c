//! Block checksums of the receiver's file and the sender's lookup over them

use crate::sync::checksum::{self, StrongChecksum};
use crate::sync::error::SyncResult;
use crate::sync::types::{validate_block_size, ChecksumSet};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Candidate block for a weak-checksum hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReference {
    pub index: u32,
    pub strong: StrongChecksum,
}

/// Weak checksum -> candidate blocks, in ascending block order per bucket
pub struct BlockIndex {
    block_size: usize,
    block_count: usize,
    buckets: HashMap<u32, Vec<BlockReference>>,
}

impl BlockIndex {
    pub fn new(set: &ChecksumSet) -> Self {
        let mut buckets: HashMap<u32, Vec<BlockReference>> = HashMap::new();

        for (index, (weak, strong)) in set.iter().enumerate() {
            buckets.entry(weak).or_default().push(BlockReference {
                index: index as u32,
                strong: *strong,
            });
        }

        Self {
            block_size: set.block_size(),
            block_count: set.block_count(),
            buckets,
        }
    }

    /// Candidates sharing the given weak checksum
    pub fn find_weak_matches(&self, weak: u32) -> Option<&[BlockReference]> {
        self.buckets.get(&weak).map(Vec::as_slice)
    }

    /// First candidate whose strong checksum matches
    pub fn find_match(&self, candidates: &[BlockReference], strong: &StrongChecksum) -> Option<u32> {
        candidates
            .iter()
            .find(|candidate| &candidate.strong == strong)
            .map(|candidate| candidate.index)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }
}

/// Builds a [`ChecksumSet`] by partitioning a file into sequential blocks
pub struct SignatureBuilder {
    block_size: usize,
}

impl SignatureBuilder {
    /// Fails with `InvalidBlockSize` unless `block_size` is in `1..=i32::MAX`
    pub fn new(block_size: usize) -> SyncResult<Self> {
        let block_size = validate_block_size(i64::try_from(block_size).unwrap_or(i64::MAX))?;
        Ok(Self { block_size })
    }

    /// Build from an in-memory buffer
    pub fn build_from_bytes(&self, data: &[u8]) -> SyncResult<ChecksumSet> {
        let mut weak = Vec::with_capacity(data.len() / self.block_size + 1);
        let mut strong = Vec::with_capacity(weak.capacity());
        let mut offset = 0u64;

        for block in data.chunks(self.block_size) {
            let end = offset + block.len() as u64 - 1;
            weak.push(checksum::weak_checksum(block, offset, end));
            strong.push(checksum::strong_checksum(block));
            offset += block.len() as u64;
        }

        ChecksumSet::new(self.block_size, weak, strong)
    }

    /// Build from a reader, one block in memory at a time
    pub async fn build_from_reader<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> SyncResult<ChecksumSet> {
        let mut weak = Vec::new();
        let mut strong = Vec::new();
        let mut buffer = vec![0u8; self.block_size];
        let mut offset = 0u64;

        loop {
            let len = read_block(reader, &mut buffer).await?;
            if len == 0 {
                break;
            }
            let block = &buffer[..len];
            weak.push(checksum::weak_checksum(block, offset, offset + len as u64 - 1));
            strong.push(checksum::strong_checksum(block));
            offset += len as u64;

            if len < self.block_size {
                break;
            }
        }

        ChecksumSet::new(self.block_size, weak, strong)
    }
}

/// Fill `buffer` unless EOF comes first; returns the number of bytes read
pub(crate) async fn read_block<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
