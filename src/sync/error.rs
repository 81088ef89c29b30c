use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Truncated literal data: expected {expected} bytes, received {received}")]
    TruncatedLiteral { expected: u64, received: u64 },

    #[error("Channel closed by peer")]
    ChannelClosed,

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(i64),
}

impl SyncError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        SyncError::Protocol(msg.into())
    }

    /// Short label used when recording failures
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Io(_) => "io",
            SyncError::Protocol(_) => "protocol",
            SyncError::TruncatedLiteral { .. } => "truncated_literal",
            SyncError::ChannelClosed => "channel_closed",
            SyncError::InvalidBlockSize(_) => "invalid_block_size",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
