//! Message framing between the two sync roles
//!
//! The sender receives one [`ChecksumSet`] and then only sends items; the
//! receiver sends one [`ChecksumSet`] and then only receives items. Each
//! channel end is driven by exactly one task.

pub mod local;
pub mod stream;
#[cfg(test)]
pub(crate) mod testing;

pub use local::{local_channel, LocalReceiverChannel, LocalSenderChannel};
pub use stream::StreamChannel;

use crate::sync::{ChecksumSet, SyncResult, TransferItem};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Channel end held by the sender (current copy)
#[async_trait]
pub trait SenderChannel: Send {
    async fn receive_checksum_set(&mut self) -> SyncResult<ChecksumSet>;

    /// Send `literal_len` bytes read from `literal`, then an optional block reference
    ///
    /// Exactly `literal_len` bytes are consumed from `literal`; a short source
    /// is an error.
    async fn send_item(
        &mut self,
        literal_len: u64,
        literal: &mut (dyn AsyncRead + Unpin + Send),
        block: Option<u32>,
    ) -> SyncResult<()>;

    /// Emit the terminal item
    async fn shutdown(&mut self) -> SyncResult<()>;
}

/// Channel end held by the receiver (stale copy)
#[async_trait]
pub trait ReceiverChannel: Send {
    async fn send_checksum_set(&mut self, set: &ChecksumSet) -> SyncResult<()>;

    /// Next item header
    ///
    /// Literal bytes of the previous item that were not read with
    /// [`receive_literal`](Self::receive_literal) are discarded.
    async fn receive_item(&mut self) -> SyncResult<TransferItem>;

    /// Copy the current item's literal bytes into `out`, one bounded chunk at a time
    ///
    /// Returns the number of bytes copied. A peer that stops short of the
    /// announced count fails with [`SyncError::TruncatedLiteral`](crate::sync::SyncError).
    async fn receive_literal(
        &mut self,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> SyncResult<u64>;
}
