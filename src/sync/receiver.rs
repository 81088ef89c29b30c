//! Receiver role: holds the stale file and rebuilds it from the sender's instructions
//!
//! The reconstruction goes to a temporary file next to the original. Only
//! after the terminal item has been received and everything is on disk is
//! the original swapped out, so a failed run leaves it untouched.

use crate::channel::ReceiverChannel;
use crate::metrics::RunMetrics;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::file_access::{backup_path, temp_path, FileAccess, LocalFileAccess};
use crate::sync::signature::SignatureBuilder;
use crate::sync::types::{
    default_block_size, validate_block_size, SyncOptions, SyncRole, SyncStats, TransferItem,
};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

pub struct Receiver<C> {
    path: PathBuf,
    channel: C,
    file_access: Arc<dyn FileAccess>,
    options: SyncOptions,
    stats: SyncStats,
}

impl<C: ReceiverChannel> Receiver<C> {
    pub fn new(path: impl Into<PathBuf>, channel: C) -> Self {
        let path = path.into();
        let stats = SyncStats::new(path.display().to_string(), SyncRole::Receiver);
        Self {
            path,
            channel,
            file_access: Arc::new(LocalFileAccess),
            options: SyncOptions::default(),
            stats,
        }
    }

    /// Override the block size heuristic
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.options.block_size = Some(block_size);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub fn file_access(mut self, file_access: Arc<dyn FileAccess>) -> Self {
        self.file_access = file_access;
        self
    }

    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.options.io_buffer_size = size.max(1);
        self
    }

    pub fn with_options(mut self, options: &SyncOptions) -> Self {
        self.options = options.clone();
        let size = options.io_buffer_size;
        self.io_buffer_size(size)
    }

    /// Statistics gathered so far, also after a failed run
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Run the receiver side of the protocol to completion
    pub async fn run(&mut self) -> SyncResult<SyncStats> {
        let start = Instant::now();
        let metrics = RunMetrics::start(SyncRole::Receiver);

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
        let mut stale = self.file_access.open_read(&self.path).await?;
        let len = stale.metadata().await?.len();
        let block_size = match self.options.block_size {
            Some(size) => validate_block_size(size as i64)?,
            None => default_block_size(len),
        };
        self.stats.block_size = block_size;

        let set = {
            let capacity = self.options.io_buffer_size.max(block_size);
            let mut reader = BufReader::with_capacity(capacity, &mut stale);
            SignatureBuilder::new(block_size)?
                .build_from_reader(&mut reader)
                .await?
        };
        self.stats.block_count = set.block_count();
        debug!(
            block_size,
            blocks = set.block_count(),
            "Computed block checksums"
        );

        self.channel.send_checksum_set(&set).await?;
        self.stats.bytes_transferred = set.wire_size();
        let block_count = set.block_count();
        drop(set);

        if self.options.dry_run {
            drop(stale);
            return self.drain(block_count).await;
        }

        let temp = temp_path(&self.path);
        let written = self
            .reconstruct(stale, &temp, block_size, block_count)
            .await;
        if let Err(e) = written {
            self.discard(&temp).await;
            return Err(e);
        }

        self.replace(&temp).await
    }

    /// Consume the item stream without writing, counting what would be applied
    async fn drain(&mut self, block_count: usize) -> SyncResult<()> {
        loop {
            match self.channel.receive_item().await? {
                TransferItem::Terminal => break,
                TransferItem::Data { block, .. } => {
                    check_block(block, block_count)?;
                    let received = self.channel.receive_literal(&mut tokio::io::sink()).await?;
                    self.stats.literal_bytes_received += received;
                    if block.is_some() {
                        self.stats.match_count += 1;
                    }
                }
            }
        }
        debug!("Dry run complete, nothing written");
        Ok(())
    }

    async fn reconstruct(
        &mut self,
        mut stale: File,
        temp: &Path,
        block_size: usize,
        block_count: usize,
    ) -> SyncResult<()> {
        let out = self.file_access.create(temp).await?;
        let mut out = BufWriter::with_capacity(self.options.io_buffer_size, out);

        loop {
            let block = match self.channel.receive_item().await? {
                TransferItem::Terminal => break,
                TransferItem::Data { block, .. } => block,
            };
            check_block(block, block_count)?;

            let received = self.channel.receive_literal(&mut out).await?;
            self.stats.literal_bytes_received += received;

            if let Some(index) = block {
                stale
                    .seek(SeekFrom::Start(index as u64 * block_size as u64))
                    .await?;
                tokio::io::copy(&mut (&mut stale).take(block_size as u64), &mut out).await?;
                self.stats.match_count += 1;
            }
        }
        debug!("Received terminal item");

        out.flush().await?;
        out.get_ref().sync_all().await?;
        Ok(())
    }

    /// Swap the reconstructed file into place of the original
    async fn replace(&self, temp: &Path) -> SyncResult<()> {
        let backup = backup_path(&self.path);

        if let Err(e) = self.file_access.rename(&self.path, &backup).await {
            self.discard(temp).await;
            return Err(e.into());
        }

        if let Err(e) = self.file_access.rename(temp, &self.path).await {
            if let Err(restore) = self.file_access.rename(&backup, &self.path).await {
                warn!(
                    "Failed to restore {} from {}: {}",
                    self.path.display(),
                    backup.display(),
                    restore
                );
            }
            self.discard(temp).await;
            return Err(e.into());
        }

        if let Err(e) = self.file_access.remove(&backup).await {
            warn!("Failed to remove backup {}: {}", backup.display(), e);
        }
        Ok(())
    }

    async fn discard(&self, temp: &Path) {
        match self.file_access.remove(temp).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to discard {}: {}", temp.display(), e),
        }
    }
}

fn check_block(block: Option<u32>, block_count: usize) -> SyncResult<()> {
    match block {
        Some(index) if index as usize >= block_count => Err(SyncError::protocol(format!(
            "block index {} out of range ({} blocks)",
            index, block_count
        ))),
        _ => Ok(()),
    }
}
