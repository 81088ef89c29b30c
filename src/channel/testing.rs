//! Test helpers shared by the channel implementations

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Sink that records how much was written and the largest single write
#[derive(Debug, Default)]
pub(crate) struct WriteRecorder {
    pub total: u64,
    pub largest_write: usize,
    pub writes: usize,
    pub data: Option<Vec<u8>>,
}

impl WriteRecorder {
    /// Also keep the written bytes
    pub fn capturing() -> Self {
        Self {
            data: Some(Vec::new()),
            ..Default::default()
        }
    }
}

impl AsyncWrite for WriteRecorder {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.total += buf.len() as u64;
        self.largest_write = self.largest_write.max(buf.len());
        self.writes += 1;
        if let Some(data) = self.data.as_mut() {
            data.extend_from_slice(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
