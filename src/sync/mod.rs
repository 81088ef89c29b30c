//! Delta synchronization module
//!
//! Two roles cooperate to bring a stale file in line with a current one:
//! the [`Receiver`] publishes block checksums of its stale copy, the
//! [`Sender`] scans the current copy with a rolling checksum and answers
//! with literal data and references to blocks the receiver already has.

pub mod checksum;
pub mod error;
pub mod file_access;
pub mod receiver;
pub mod rolling_hash;
pub mod sender;
pub mod signature;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use file_access::{FileAccess, LocalFileAccess};
pub use receiver::Receiver;
pub use rolling_hash::RollingChecksum;
pub use sender::Sender;
pub use signature::{BlockIndex, BlockReference, SignatureBuilder};
pub use types::{
    default_block_size, ChecksumSet, SyncOptions, SyncRole, SyncStats, TransferItem,
};
