//! Sender role: holds the current file and streams reconstruction instructions
//!
//! The sender never modifies its file. It receives the receiver's block
//! checksums, scans its own file once with a rolling checksum and emits
//! literal data interleaved with references to receiver blocks.

use crate::channel::SenderChannel;
use crate::metrics::RunMetrics;
use crate::sync::error::SyncResult;
use crate::sync::file_access::{FileAccess, LocalFileAccess};
use crate::sync::rolling_hash::RollingChecksum;
use crate::sync::signature::BlockIndex;
use crate::sync::types::{SyncOptions, SyncRole, SyncStats, DEFAULT_IO_BUFFER_SIZE};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

pub struct Sender<C> {
    path: PathBuf,
    channel: C,
    file_access: Arc<dyn FileAccess>,
    io_buffer_size: usize,
    stats: SyncStats,
}

impl<C: SenderChannel> Sender<C> {
    pub fn new(path: impl Into<PathBuf>, channel: C) -> Self {
        let path = path.into();
        let stats = SyncStats::new(path.display().to_string(), SyncRole::Sender);
        Self {
            path,
            channel,
            file_access: Arc::new(LocalFileAccess),
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            stats,
        }
    }

    pub fn file_access(mut self, file_access: Arc<dyn FileAccess>) -> Self {
        self.file_access = file_access;
        self
    }

    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size.max(1);
        self
    }

    /// Apply the options relevant to this side (block size is the receiver's choice)
    pub fn with_options(self, options: &SyncOptions) -> Self {
        self.io_buffer_size(options.io_buffer_size)
    }

    /// Statistics gathered so far, also after a failed run
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Run the sender side of the protocol to completion
    pub async fn run(&mut self) -> SyncResult<SyncStats> {
        let start = Instant::now();
        let metrics = RunMetrics::start(SyncRole::Sender);

        let result = self.sync().await;
        self.stats.finish(start.elapsed());

        match result {
            Ok(()) => {
                metrics.complete(&self.stats);
                info!("{}", self.stats);
                Ok(self.stats.clone())
            }
            Err(e) => {
                metrics.fail(&e);
                Err(e)
            }
        }
    }

    async fn sync(&mut self) -> SyncResult<()> {
        let set = self.channel.receive_checksum_set().await?;
        self.stats.block_size = set.block_size();
        self.stats.block_count = set.block_count();
        let index = BlockIndex::new(&set);
        drop(set);

        let file = self.file_access.open_read(&self.path).await?;
        let total = file.metadata().await?.len();
        let block_size = index.block_size() as u64;
        let capacity = self.io_buffer_size.max(2 * index.block_size());
        let mut reader = BufReader::with_capacity(capacity, file);

        if total < block_size {
            debug!(total, block_size, "File smaller than one block, sending it whole");
            self.send_range(&mut reader, 0, total, None, None).await?;
        } else {
            self.find_matches(&index, &mut reader, total).await?;
        }

        self.channel.shutdown().await
    }

    /// Single forward pass over the file looking for receiver blocks
    async fn find_matches(
        &mut self,
        index: &BlockIndex,
        reader: &mut BufReader<File>,
        total: u64,
    ) -> SyncResult<()> {
        let block_size = index.block_size() as u64;
        let mut window = vec![0u8; index.block_size()];
        reader.read_exact(&mut window).await?;

        let mut rolling = RollingChecksum::new(&window);
        let mut end_of_last_match = 0u64;
        let mut in_miss_run = false;

        // The reader always sits just past the window: at `k + block_size`
        loop {
            let k = rolling.start();
            let matched = match index.find_weak_matches(rolling.digest()) {
                Some(candidates) => {
                    self.stats.weak_match_count += 1;
                    index.find_match(candidates, &rolling.strong_checksum())
                }
                None => None,
            };

            if let Some(block) = matched {
                self.stats.match_count += 1;
                in_miss_run = false;

                let next = k + block_size;
                let literal_len = k - end_of_last_match;
                self.send_range(reader, end_of_last_match, literal_len, Some(block), Some(next))
                    .await?;
                end_of_last_match = next;

                if total - next < block_size {
                    break;
                }
                reader.read_exact(&mut window).await?;
                rolling.reset(&window, next);
            } else if k + block_size < total {
                if !in_miss_run {
                    in_miss_run = true;
                    self.stats.miss_count += 1;
                }
                let byte = reader.read_u8().await?;
                rolling.roll(byte);
            } else {
                break;
            }
        }

        let remaining = total - end_of_last_match;
        self.send_range(reader, end_of_last_match, remaining, None, None)
            .await
    }

    /// Send `len` bytes starting at `from` plus an optional block reference,
    /// then put the reader back at `resume_at`
    async fn send_range(
        &mut self,
        reader: &mut BufReader<File>,
        from: u64,
        len: u64,
        block: Option<u32>,
        resume_at: Option<u64>,
    ) -> SyncResult<()> {
        if len > 0 {
            reader.seek(SeekFrom::Start(from)).await?;
        }
        self.channel.send_item(len, reader, block).await?;
        self.stats.bytes_transferred += len;

        if len > 0 {
            if let Some(position) = resume_at {
                reader.seek(SeekFrom::Start(position)).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{local_channel, ReceiverChannel};
    use crate::sync::{SignatureBuilder, SyncError, TransferItem};
    use tempfile::TempDir;

    /// Run a sender against fixed receiver content and collect the item stream
    async fn run_sender(
        current: &[u8],
        stale: &[u8],
        block_size: usize,
    ) -> (SyncStats, Vec<(TransferItem, Vec<u8>)>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current");
        tokio::fs::write(&path, current).await.unwrap();

        let (sender_end, mut receiver_end) = local_channel();
        let set = SignatureBuilder::new(block_size)
            .unwrap()
            .build_from_bytes(stale)
            .unwrap();
        receiver_end.send_checksum_set(&set).await.unwrap();

        let task = tokio::spawn(async move {
            let mut sender = Sender::new(path, sender_end);
            sender.run().await
        });

        let mut items = Vec::new();
        loop {
            let item = receiver_end.receive_item().await.unwrap();
            if item.is_terminal() {
                break;
            }
            let mut literal = Vec::new();
            receiver_end.receive_literal(&mut literal).await.unwrap();
            items.push((item, literal));
        }

        let stats = task.await.unwrap().unwrap();
        (stats, items)
    }

    #[tokio::test]
    async fn test_identical_content() {
        let data = b"AAAABBBBCCCCDDDD";
        let (stats, items) = run_sender(data, data, 4).await;

        assert_eq!(stats.match_count, 4);
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.bytes_transferred, 0);
        assert_eq!(
            items,
            vec![
                (TransferItem::block(0, 0), Vec::new()),
                (TransferItem::block(0, 1), Vec::new()),
                (TransferItem::block(0, 2), Vec::new()),
                (TransferItem::block(0, 3), Vec::new()),
                (TransferItem::literal(0), Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_changed_block() {
        let (stats, items) = run_sender(b"AAAAXXXXCCCCDDDD", b"AAAABBBBCCCCDDDD", 4).await;

        assert_eq!(stats.match_count, 3);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.bytes_transferred, 4);
        assert_eq!(
            items,
            vec![
                (TransferItem::block(0, 0), Vec::new()),
                (TransferItem::block(4, 2), b"XXXX".to_vec()),
                (TransferItem::block(0, 3), Vec::new()),
                (TransferItem::literal(0), Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_appended_tail_is_literal() {
        let (stats, items) = run_sender(b"AAAABBBBCCCCDDDDEE", b"AAAABBBBCCCCDDDD", 4).await;

        assert_eq!(stats.match_count, 4);
        assert_eq!(stats.bytes_transferred, 2);
        assert_eq!(items.last(), Some(&(TransferItem::literal(2), b"EE".to_vec())));
    }

    #[tokio::test]
    async fn test_first_matching_candidate_wins() {
        // Every receiver block is identical; the lowest index must be chosen
        let (stats, items) = run_sender(b"ZZZZ", b"ZZZZZZZZZZZZ", 4).await;

        assert_eq!(stats.match_count, 1);
        assert_eq!(items[0], (TransferItem::block(0, 0), Vec::new()));
    }

    #[tokio::test]
    async fn test_small_file_sent_whole() {
        let (stats, items) = run_sender(b"tiny", b"something much longer than a block", 16).await;

        assert_eq!(stats.match_count, 0);
        assert_eq!(stats.weak_match_count, 0);
        assert_eq!(stats.bytes_transferred, 4);
        assert_eq!(items, vec![(TransferItem::literal(4), b"tiny".to_vec())]);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (stats, items) = run_sender(b"", b"stale data", 4).await;

        assert_eq!(stats.bytes_transferred, 0);
        assert_eq!(items, vec![(TransferItem::literal(0), Vec::new())]);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let (sender_end, mut receiver_end) = local_channel();
        let set = SignatureBuilder::new(4).unwrap().build_from_bytes(b"abcd").unwrap();
        receiver_end.send_checksum_set(&set).await.unwrap();

        let mut sender = Sender::new(dir.path().join("absent"), sender_end);
        let result = sender.run().await;

        assert!(matches!(result, Err(SyncError::Io(_))));
        assert_eq!(sender.stats().block_count, 1);
    }
}
