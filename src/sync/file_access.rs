//! Host-supplied file operations
//!
//! The engine opens, creates, renames and removes files only through this
//! trait so the host can layer ownership or permission handling on top.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

#[async_trait]
pub trait FileAccess: Send + Sync {
    /// Open an existing file read-only
    async fn open_read(&self, path: &Path) -> io::Result<File>;

    /// Create (or truncate) a file for writing
    async fn create(&self, path: &Path) -> io::Result<File>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Plain local filesystem access
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileAccess;

#[async_trait]
impl FileAccess for LocalFileAccess {
    async fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }

    async fn create(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Temporary reconstruction file next to `target`
pub fn temp_path(target: &Path) -> PathBuf {
    sibling(target, "sync-tmp")
}

/// Backup name used while swapping the reconstructed file into place
pub fn backup_path(target: &Path) -> PathBuf {
    sibling(target, "sync-orig")
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}", name, suffix))
}
