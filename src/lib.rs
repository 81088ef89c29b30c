//! Two-party delta synchronization of a single file
//!
//! A receiver holding a stale copy and a sender holding the current copy
//! exchange block checksums and reconstruction instructions so that only
//! the changed regions cross the channel.
//!
//! ```no_run
//! use deltasync::channel::local_channel;
//! use deltasync::sync::{Receiver, Sender};
//!
//! # async fn demo() -> deltasync::sync::SyncResult<()> {
//! let (sender_end, receiver_end) = local_channel();
//! let mut sender = Sender::new("current.bin", sender_end);
//! let mut receiver = Receiver::new("stale.bin", receiver_end);
//! let (sent, received) = tokio::try_join!(sender.run(), receiver.run())?;
//! println!("{}\n{}", sent, received);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod metrics;
pub mod sync;

pub use channel::{local_channel, ReceiverChannel, SenderChannel, StreamChannel};
pub use sync::{Receiver, Sender, SyncError, SyncOptions, SyncResult, SyncStats};
