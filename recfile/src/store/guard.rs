//! Crash-safety around destructive rewrites
//!
//! - [`StoreLock`]: advisory exclusive lock on `<store>.lock`
//! - [`Backup`]: verified copy of the pre-mutation bytes at `<store>.<token>.bak`
//! - [`replace_contents`]: write `<store>.<token>.tmp`, fsync, rename over the store

use crate::error::{Error, Result};
use crate::exec::OpContext;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique per-operation token for backup and temp file names
pub fn operation_token() -> String {
    format!(
        "{}-{}-{}",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%6f"),
        std::process::id(),
        TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn sibling(store: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(store.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn lock_path(store: &Path) -> PathBuf {
    sibling(store, ".lock")
}

pub fn backup_path(store: &Path, token: &str) -> PathBuf {
    sibling(store, &format!(".{}.bak", token))
}

fn temp_path(store: &Path, token: &str) -> PathBuf {
    sibling(store, &format!(".{}.tmp", token))
}

/// Exclusive advisory lock held for the lifetime of a mutation
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Poll for the lock until `timeout` or the caller deadline runs out
    pub async fn acquire(store: &Path, timeout: Duration, cx: &OpContext) -> Result<Self> {
        let path = lock_path(store);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        let (wait, bounded_by_caller) = match cx.remaining() {
            Some(remaining) if remaining < timeout => (remaining, true),
            _ => (timeout, false),
        };
        let started = tokio::time::Instant::now();
        let contended = fs2::lock_contended_error();

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::debug!("Acquired {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.raw_os_error() == contended.raw_os_error() => {}
                Err(e) => return Err(e.into()),
            }
            if started.elapsed() >= wait {
                return Err(if bounded_by_caller {
                    Error::DeadlineExceeded
                } else {
                    Error::LockTimeout(path)
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Verified copy of a store's bytes taken before a destructive rewrite
#[derive(Debug)]
pub struct Backup {
    path: PathBuf,
    store: PathBuf,
}

impl Backup {
    /// Write `original` next to the store and read it back to verify it
    pub async fn create(store: &Path, original: &[u8], token: &str) -> Result<Self> {
        let path = backup_path(store, token);
        tokio::fs::write(&path, original).await?;

        let written = tokio::fs::read(&path).await?;
        if Sha256::digest(&written) != Sha256::digest(original) {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(Error::BackupMismatch(path));
        }

        tracing::debug!("Backed up {} to {}", store.display(), path.display());
        Ok(Self {
            path,
            store: store.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the backup over the store
    pub async fn restore(&self) -> Result<()> {
        tokio::fs::copy(&self.path, &self.store).await?;
        tracing::info!("Restored {} from {}", self.store.display(), self.path.display());
        Ok(())
    }

    /// Delete the backup file
    pub async fn discard(self) -> Result<()> {
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }
}

/// Replace the store's contents through a temp file and rename.
///
/// The store keeps its permissions. On failure the temp file is removed
/// and the store itself was never opened for writing.
pub async fn replace_contents(store: &Path, contents: &[u8], token: &str) -> Result<()> {
    let tmp = temp_path(store, token);
    let result = write_and_rename(store, &tmp, contents).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn write_and_rename(store: &Path, tmp: &Path, contents: &[u8]) -> Result<()> {
    let permissions = tokio::fs::metadata(store).await.ok().map(|m| m.permissions());

    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    if let Some(permissions) = permissions {
        tokio::fs::set_permissions(tmp, permissions).await?;
    }
    tokio::fs::rename(tmp, store).await?;
    Ok(())
}
