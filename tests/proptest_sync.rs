//! Property tests: any stale file converges to any current file

use deltasync::channel::local_channel;
use deltasync::sync::{Receiver, Sender, SyncStats};
use proptest::prelude::*;
use tempfile::TempDir;

fn sync_bytes(current: &[u8], stale: &[u8], block_size: usize) -> (Vec<u8>, SyncStats) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let dir = TempDir::new().unwrap();
        let current_path = dir.path().join("current");
        let stale_path = dir.path().join("stale");
        tokio::fs::write(&current_path, current).await.unwrap();
        tokio::fs::write(&stale_path, stale).await.unwrap();

        let (sender_end, receiver_end) = local_channel();
        let mut sender = Sender::new(&current_path, sender_end);
        let mut receiver = Receiver::new(&stale_path, receiver_end).block_size(block_size);
        let (sent, _) = tokio::try_join!(sender.run(), receiver.run()).unwrap();

        (tokio::fs::read(&stale_path).await.unwrap(), sent)
    })
}

/// A current file derived from the stale one by a few edits
fn edited_pair() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        prop::collection::vec(any::<u8>(), 0..4096),
        prop::collection::vec((any::<prop::sample::Index>(), 0usize..3, any::<u8>()), 0..6),
    )
        .prop_map(|(stale, edits)| {
            let mut current = stale.clone();
            for (at, kind, byte) in edits {
                if current.is_empty() {
                    current.push(byte);
                    continue;
                }
                let i = at.index(current.len());
                match kind {
                    0 => current[i] = byte,
                    1 => current.insert(i, byte),
                    _ => {
                        current.remove(i);
                    }
                }
            }
            (current, stale)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_unrelated_files_converge(
        current in prop::collection::vec(any::<u8>(), 0..3000),
        stale in prop::collection::vec(any::<u8>(), 0..3000),
        block_size in 1usize..600,
    ) {
        let (result, _) = sync_bytes(&current, &stale, block_size);
        prop_assert_eq!(result, current);
    }

    #[test]
    fn prop_edited_files_converge(
        (current, stale) in edited_pair(),
        block_size in 16usize..512,
    ) {
        let (result, sent) = sync_bytes(&current, &stale, block_size);
        prop_assert_eq!(&result, &current);
        prop_assert!(sent.bytes_transferred <= current.len() as u64);
    }

    #[test]
    fn prop_identical_files_send_only_tail(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        block_size in 1usize..700,
    ) {
        let (result, sent) = sync_bytes(&data, &data, block_size);
        prop_assert_eq!(&result, &data);
        if data.len() >= block_size {
            prop_assert_eq!(sent.miss_count, 0);
            prop_assert_eq!(sent.bytes_transferred, (data.len() % block_size) as u64);
        }
    }
}
