//! Byte-stream wire format
//!
//! All integers are big-endian.
//!
//! ```text
//! checksum set: i32 block_size, i32 block_count,
//!               block_count x (i64 weak, [u8; 16] strong)
//! item:         i32 block_index (-1 = none), i64 literal_len,
//!               literal_len raw bytes if positive
//! terminal:     i32 -1, i64 -1
//! ```
//!
//! Literal bytes are streamed through a bounded buffer on both ends.

use crate::channel::{ReceiverChannel, SenderChannel};
use crate::sync::checksum::STRONG_CHECKSUM_LEN;
use crate::sync::types::{validate_block_size, DEFAULT_IO_BUFFER_SIZE};
use crate::sync::{ChecksumSet, SyncError, SyncResult, TransferItem};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::debug;

/// Size of an item header on the wire
pub const ITEM_HEADER_LEN: usize = 12;

/// Largest up-front allocation made on the strength of a peer-supplied count
const MAX_PREALLOC: usize = 64 * 1024;

/// Append the wire encoding of `set` to `buf`
pub fn encode_checksum_set(set: &ChecksumSet, buf: &mut BytesMut) -> SyncResult<()> {
    let count = i32::try_from(set.block_count())
        .map_err(|_| SyncError::protocol(format!("too many blocks: {}", set.block_count())))?;

    buf.reserve(set.wire_size() as usize);
    buf.put_i32(set.block_size() as i32);
    buf.put_i32(count);
    for (weak, strong) in set.iter() {
        buf.put_i64(weak as i64);
        buf.put_slice(strong);
    }
    Ok(())
}

/// Append the header of an item carrying `literal_len` bytes and an optional block
pub fn encode_item_header(
    literal_len: i64,
    block: Option<u32>,
    buf: &mut BytesMut,
) -> SyncResult<()> {
    let index = match block {
        Some(index) => i32::try_from(index)
            .map_err(|_| SyncError::protocol(format!("block index out of range: {}", index)))?,
        None => TransferItem::SENTINEL as i32,
    };
    buf.put_i32(index);
    buf.put_i64(literal_len);
    Ok(())
}

/// Protocol channel over any bidirectional byte stream (TCP socket, pipe, duplex)
///
/// Literal data is never held in memory as a whole: it is copied through a
/// scratch buffer of at most `chunk_size` bytes.
pub struct StreamChannel<S> {
    stream: BufStream<S>,
    chunk_size: usize,
    /// Literal bytes of the current item still unread on the stream
    pending: u64,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self::with_capacity(DEFAULT_IO_BUFFER_SIZE, stream)
    }

    /// Use `capacity` for the stream buffers and as the literal chunk size
    pub fn with_capacity(capacity: usize, stream: S) -> Self {
        let capacity = capacity.max(1);
        Self {
            stream: BufStream::with_capacity(capacity, capacity, stream),
            chunk_size: capacity,
            pending: 0,
        }
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Unwrap the stream; unflushed or unread buffered bytes are lost
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    async fn read_checksum_set(&mut self) -> SyncResult<ChecksumSet> {
        let block_size = validate_block_size(self.stream.read_i32().await? as i64)?;
        let count = self.stream.read_i32().await?;
        if count < 0 {
            return Err(SyncError::protocol(format!("negative block count: {}", count)));
        }

        let count = count as usize;
        let mut weak = Vec::with_capacity(count.min(MAX_PREALLOC));
        let mut strong = Vec::with_capacity(count.min(MAX_PREALLOC));
        for index in 0..count {
            let value = self.stream.read_i64().await?;
            let value = u32::try_from(value).map_err(|_| {
                SyncError::protocol(format!(
                    "weak checksum of block {} out of range: {}",
                    index, value
                ))
            })?;
            let mut digest = [0u8; STRONG_CHECKSUM_LEN];
            self.stream.read_exact(&mut digest).await?;
            weak.push(value);
            strong.push(digest);
        }

        ChecksumSet::new(block_size, weak, strong)
    }

    async fn read_item(&mut self) -> SyncResult<TransferItem> {
        let index = self.stream.read_i32().await?;
        let literal_len = self.stream.read_i64().await?;

        if index == TransferItem::SENTINEL as i32 && literal_len == TransferItem::SENTINEL {
            return Ok(TransferItem::Terminal);
        }
        if literal_len < 0 {
            return Err(SyncError::protocol(format!(
                "invalid literal count {} for block {}",
                literal_len, index
            )));
        }
        if index < TransferItem::SENTINEL as i32 {
            return Err(SyncError::protocol(format!("invalid block index: {}", index)));
        }

        self.pending = literal_len as u64;
        Ok(TransferItem::Data {
            literal_len: literal_len as u64,
            block: (index >= 0).then_some(index as u32),
        })
    }

    async fn copy_literal(&mut self, out: &mut (dyn AsyncWrite + Unpin + Send)) -> SyncResult<u64> {
        let expected = self.pending;
        let mut buffer = vec![0u8; expected.min(self.chunk_size as u64) as usize];
        let mut copied = 0u64;

        while self.pending > 0 {
            let want = self.pending.min(buffer.len() as u64) as usize;
            let n = self.stream.read(&mut buffer[..want]).await?;
            if n == 0 {
                self.pending = 0;
                return Err(SyncError::TruncatedLiteral {
                    expected,
                    received: copied,
                });
            }
            out.write_all(&buffer[..n]).await?;
            self.pending -= n as u64;
            copied += n as u64;
        }
        Ok(copied)
    }
}

/// EOF while waiting for the next message means the peer went away
fn closed_on_eof(err: SyncError) -> SyncError {
    match err {
        SyncError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => SyncError::ChannelClosed,
        other => other,
    }
}

#[async_trait]
impl<S> SenderChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive_checksum_set(&mut self) -> SyncResult<ChecksumSet> {
        let set = self.read_checksum_set().await.map_err(closed_on_eof)?;
        debug!(
            block_size = set.block_size(),
            blocks = set.block_count(),
            "Received checksum set"
        );
        Ok(set)
    }

    async fn send_item(
        &mut self,
        literal_len: u64,
        literal: &mut (dyn AsyncRead + Unpin + Send),
        block: Option<u32>,
    ) -> SyncResult<()> {
        let wire_len = i64::try_from(literal_len)
            .map_err(|_| SyncError::protocol(format!("literal too long: {}", literal_len)))?;

        let mut header = BytesMut::with_capacity(ITEM_HEADER_LEN);
        encode_item_header(wire_len, block, &mut header)?;
        self.stream.write_all(&header).await?;

        if literal_len > 0 {
            let copied = tokio::io::copy(&mut literal.take(literal_len), &mut self.stream).await?;
            if copied < literal_len {
                return Err(SyncError::TruncatedLiteral {
                    expected: literal_len,
                    received: copied,
                });
            }
        }

        self.stream.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> SyncResult<()> {
        let mut header = BytesMut::with_capacity(ITEM_HEADER_LEN);
        header.put_i32(TransferItem::SENTINEL as i32);
        header.put_i64(TransferItem::SENTINEL);
        self.stream.write_all(&header).await?;
        self.stream.flush().await?;
        debug!("Sent terminal item");
        Ok(())
    }
}

#[async_trait]
impl<S> ReceiverChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_checksum_set(&mut self, set: &ChecksumSet) -> SyncResult<()> {
        let mut buf = BytesMut::new();
        encode_checksum_set(set, &mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive_item(&mut self) -> SyncResult<TransferItem> {
        if self.pending > 0 {
            self.copy_literal(&mut tokio::io::sink()).await?;
        }
        self.read_item().await.map_err(closed_on_eof)
    }

    async fn receive_literal(
        &mut self,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> SyncResult<u64> {
        self.copy_literal(out).await
    }
}
