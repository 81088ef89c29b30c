use anyhow::{bail, Context, Result};
use deltasync::metrics::init_metrics;
use deltasync::sync::{Receiver, Sender, SyncOptions};
use deltasync::StreamChannel;
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    init_metrics();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: deltasync-demo <current-file> <stale-file> [block-size]");
    }
    let current = PathBuf::from(&args[1]);
    let stale = PathBuf::from(&args[2]);

    let mut options = SyncOptions::default();
    if let Some(size) = args.get(3) {
        let size = size
            .parse()
            .with_context(|| format!("invalid block size: {}", size))?;
        options.block_size = Some(size);
    }

    // Loopback connection standing in for a remote peer
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (client, accepted) = tokio::try_join!(TcpStream::connect(addr), async {
        listener.accept().await.map(|(stream, _)| stream)
    })?;
    info!("Syncing {} -> {} over {}", current.display(), stale.display(), addr);

    let mut sender = Sender::new(current, StreamChannel::new(accepted)).with_options(&options);
    let mut receiver = Receiver::new(stale, StreamChannel::new(client)).with_options(&options);

    let (sent, received) = tokio::try_join!(sender.run(), receiver.run())
        .context("sync failed")?;

    println!("{}", serde_json::to_string_pretty(&sent)?);
    println!("{}", serde_json::to_string_pretty(&received)?);
    Ok(())
}
