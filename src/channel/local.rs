//! In-process channel pair for running both roles inside one runtime

use crate::channel::{ReceiverChannel, SenderChannel};
use crate::sync::types::DEFAULT_IO_BUFFER_SIZE;
use crate::sync::{ChecksumSet, SyncError, SyncResult, TransferItem};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Messages in flight before the sender has to wait for the receiver
const MESSAGE_QUEUE_DEPTH: usize = 16;

/// Largest literal chunk placed on the queue
const LITERAL_CHUNK_SIZE: usize = DEFAULT_IO_BUFFER_SIZE;

#[derive(Debug)]
enum Message {
    /// Item header; `literal_len` bytes follow as `Literal` chunks
    Item(TransferItem),
    Literal(Bytes),
}

/// Sender-side end of an in-process channel
pub struct LocalSenderChannel {
    checksums: Option<oneshot::Receiver<ChecksumSet>>,
    messages: mpsc::Sender<Message>,
}

/// Receiver-side end of an in-process channel
pub struct LocalReceiverChannel {
    checksums: Option<oneshot::Sender<ChecksumSet>>,
    messages: mpsc::Receiver<Message>,
    /// Literal bytes of the current item not yet received
    pending: u64,
}

/// Create a connected pair of channel ends
pub fn local_channel() -> (LocalSenderChannel, LocalReceiverChannel) {
    let (checksum_tx, checksum_rx) = oneshot::channel();
    let (message_tx, message_rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);

    (
        LocalSenderChannel {
            checksums: Some(checksum_rx),
            messages: message_tx,
        },
        LocalReceiverChannel {
            checksums: Some(checksum_tx),
            messages: message_rx,
            pending: 0,
        },
    )
}

impl LocalSenderChannel {
    async fn push(&mut self, message: Message) -> SyncResult<()> {
        self.messages
            .send(message)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

#[async_trait]
impl SenderChannel for LocalSenderChannel {
    async fn receive_checksum_set(&mut self) -> SyncResult<ChecksumSet> {
        let checksums = self
            .checksums
            .take()
            .ok_or_else(|| SyncError::protocol("checksum set already received"))?;
        checksums.await.map_err(|_| SyncError::ChannelClosed)
    }

    async fn send_item(
        &mut self,
        literal_len: u64,
        literal: &mut (dyn AsyncRead + Unpin + Send),
        block: Option<u32>,
    ) -> SyncResult<()> {
        self.push(Message::Item(TransferItem::Data { literal_len, block }))
            .await?;

        let mut sent = 0u64;
        while sent < literal_len {
            let want = (literal_len - sent).min(LITERAL_CHUNK_SIZE as u64);
            let mut chunk = Vec::with_capacity(want as usize);
            (&mut *literal).take(want).read_to_end(&mut chunk).await?;
            if chunk.is_empty() {
                return Err(SyncError::TruncatedLiteral {
                    expected: literal_len,
                    received: sent,
                });
            }
            sent += chunk.len() as u64;
            self.push(Message::Literal(chunk.into())).await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> SyncResult<()> {
        self.push(Message::Item(TransferItem::Terminal)).await
    }
}

#[async_trait]
impl ReceiverChannel for LocalReceiverChannel {
    async fn send_checksum_set(&mut self, set: &ChecksumSet) -> SyncResult<()> {
        let checksums = self
            .checksums
            .take()
            .ok_or_else(|| SyncError::protocol("checksum set already sent"))?;
        checksums
            .send(set.clone())
            .map_err(|_| SyncError::ChannelClosed)
    }

    async fn receive_item(&mut self) -> SyncResult<TransferItem> {
        if self.pending > 0 {
            self.receive_literal(&mut tokio::io::sink()).await?;
        }

        match self.messages.recv().await {
            Some(Message::Item(item)) => {
                if let TransferItem::Data { literal_len, .. } = item {
                    self.pending = literal_len;
                }
                Ok(item)
            }
            Some(Message::Literal(_)) => Err(SyncError::protocol(
                "literal data without an item header",
            )),
            None => Err(SyncError::ChannelClosed),
        }
    }

    async fn receive_literal(
        &mut self,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> SyncResult<u64> {
        let expected = self.pending;
        let mut copied = 0u64;

        while self.pending > 0 {
            let chunk = match self.messages.recv().await {
                Some(Message::Literal(chunk)) if chunk.len() as u64 <= self.pending => chunk,
                Some(Message::Literal(chunk)) => {
                    self.pending = 0;
                    return Err(SyncError::protocol(format!(
                        "literal chunk of {} bytes overruns the item ({} remaining)",
                        chunk.len(),
                        expected - copied
                    )));
                }
                Some(Message::Item(_)) | None => {
                    self.pending = 0;
                    return Err(SyncError::TruncatedLiteral {
                        expected,
                        received: copied,
                    });
                }
            };
            out.write_all(&chunk).await?;
            self.pending -= chunk.len() as u64;
            copied += chunk.len() as u64;
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::WriteRecorder;

    #[tokio::test]
    async fn test_checksum_handoff() {
        let (mut sender, mut receiver) = local_channel();
        let set = ChecksumSet::new(4, vec![1, 2], vec![[1u8; 16], [2u8; 16]]).unwrap();

        receiver.send_checksum_set(&set).await.unwrap();
        assert_eq!(sender.receive_checksum_set().await.unwrap(), set);

        assert!(matches!(
            receiver.send_checksum_set(&set).await,
            Err(SyncError::Protocol(_))
        ));
        assert!(matches!(
            sender.receive_checksum_set().await,
            Err(SyncError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_items_in_order() {
        let (mut sender, mut receiver) = local_channel();

        let writer = tokio::spawn(async move {
            for i in 0..40u32 {
                let literal = vec![i as u8; i as usize];
                sender
                    .send_item(i as u64, &mut literal.as_slice(), Some(i))
                    .await
                    .unwrap();
            }
            sender.shutdown().await.unwrap();
        });

        for i in 0..40u32 {
            let item = receiver.receive_item().await.unwrap();
            assert_eq!(item, TransferItem::block(i as u64, i));

            let mut literal = Vec::new();
            let copied = receiver.receive_literal(&mut literal).await.unwrap();
            assert_eq!(copied, i as u64);
            assert_eq!(literal, vec![i as u8; i as usize]);
        }
        assert!(receiver.receive_item().await.unwrap().is_terminal());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_large_literal_is_chunked() {
        let (mut sender, mut receiver) = local_channel();
        let literal_len = 20 * LITERAL_CHUNK_SIZE as u64 + 17;

        let writer = tokio::spawn(async move {
            let mut source = tokio::io::repeat(7).take(literal_len);
            sender.send_item(literal_len, &mut source, None).await.unwrap();
            sender.shutdown().await.unwrap();
        });

        assert_eq!(
            receiver.receive_item().await.unwrap(),
            TransferItem::literal(literal_len)
        );
        let mut recorder = WriteRecorder::default();
        let copied = receiver.receive_literal(&mut recorder).await.unwrap();

        assert_eq!(copied, literal_len);
        assert_eq!(recorder.total, literal_len);
        assert!(recorder.largest_write <= LITERAL_CHUNK_SIZE);
        assert!(receiver.receive_item().await.unwrap().is_terminal());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unread_literal_is_skipped() {
        let (mut sender, mut receiver) = local_channel();

        let writer = tokio::spawn(async move {
            sender.send_item(5, &mut &b"first"[..], Some(1)).await.unwrap();
            sender.send_item(6, &mut &b"second"[..], None).await.unwrap();
            sender.shutdown().await.unwrap();
        });

        assert_eq!(receiver.receive_item().await.unwrap(), TransferItem::block(5, 1));
        assert_eq!(receiver.receive_item().await.unwrap(), TransferItem::literal(6));

        let mut literal = Vec::new();
        receiver.receive_literal(&mut literal).await.unwrap();
        assert_eq!(literal, b"second");
        assert!(receiver.receive_item().await.unwrap().is_terminal());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_short_source_truncates_literal() {
        let (mut sender, mut receiver) = local_channel();

        let writer = tokio::spawn(async move {
            let result = sender.send_item(10, &mut &b"abc"[..], None).await;
            assert!(matches!(
                result,
                Err(SyncError::TruncatedLiteral {
                    expected: 10,
                    received: 3
                })
            ));
        });

        assert_eq!(receiver.receive_item().await.unwrap(), TransferItem::literal(10));
        let mut literal = Vec::new();
        let result = receiver.receive_literal(&mut literal).await;
        assert!(matches!(
            result,
            Err(SyncError::TruncatedLiteral {
                expected: 10,
                received: 3
            })
        ));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_peer() {
        let (sender, mut receiver) = local_channel();
        drop(sender);
        assert!(matches!(
            receiver.receive_item().await,
            Err(SyncError::ChannelClosed)
        ));

        let (mut sender, receiver) = local_channel();
        drop(receiver);
        assert!(matches!(
            sender.receive_checksum_set().await,
            Err(SyncError::ChannelClosed)
        ));
        assert!(matches!(
            sender.shutdown().await,
            Err(SyncError::ChannelClosed)
        ));
    }
}
