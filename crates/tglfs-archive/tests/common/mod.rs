//! Shared fixtures for archive integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tempfile::TempDir;

use tglfs_archive::Archive;
use tglfs_channel::{Channel, MailboxChannel, MessageStream};
use tglfs_chunks::ScratchDir;
use tglfs_core::config::{DownloadStrategy, TglfsConfig};
use tglfs_core::{MessageHandle, TglfsError, TglfsResult};

pub const CHUNK: u64 = 1024;

pub fn test_config(chunk_size: u64, strategy: DownloadStrategy) -> TglfsConfig {
    let mut config = TglfsConfig::default();
    config.chunking.chunk_size_bytes = chunk_size;
    // Low iteration count keeps debug-build tests fast
    config.crypto.kdf_iterations = 1000;
    config.transfer.batch_limit = 2;
    config.transfer.batch_delay_ms = 0;
    config.download.strategy = strategy;
    config
}

pub fn archive_over(channel: Arc<dyn Channel>, tmp: &TempDir, config: TglfsConfig) -> Archive {
    let scratch = ScratchDir::new(tmp.path().join("scratch")).expect("scratch dir");
    Archive::new(channel, config, scratch)
}

pub fn memory_mailbox() -> Arc<MailboxChannel> {
    Arc::new(MailboxChannel::memory().expect("memory mailbox"))
}

pub fn write_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

/// Deterministic non-repeating-ish test bytes
pub fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect()
}

pub fn password(pw: &str) -> SecretString {
    SecretString::from(pw.to_string())
}

pub fn scratch_is_empty(tmp: &TempDir) -> bool {
    std::fs::read_dir(tmp.path().join("scratch"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// Channel that starts failing one kind of operation after `allowed` calls.
pub struct FlakyChannel {
    inner: Arc<MailboxChannel>,
    fails: &'static str,
    remaining: AtomicUsize,
}

impl FlakyChannel {
    pub fn new(inner: Arc<MailboxChannel>, fails: &'static str, allowed: usize) -> Self {
        Self {
            inner,
            fails,
            remaining: AtomicUsize::new(allowed),
        }
    }

    fn gate(&self, operation: &'static str) -> TglfsResult<()> {
        if operation != self.fails {
            return Ok(());
        }
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed {
            Ok(())
        } else {
            Err(TglfsError::channel(operation, "injected failure"))
        }
    }
}

#[async_trait]
impl Channel for FlakyChannel {
    async fn send(&self, target: &str, caption: &str, attachment: &Path) -> TglfsResult<MessageHandle> {
        self.gate("send")?;
        self.inner.send(target, caption, attachment).await
    }

    async fn search(&self, target: &str, query: &str) -> TglfsResult<MessageStream<'_>> {
        self.gate("search")?;
        self.inner.search(target, query).await
    }

    async fn edit(&self, handle: &MessageHandle, caption: &str) -> TglfsResult<()> {
        self.gate("edit")?;
        self.inner.edit(handle, caption).await
    }

    async fn delete(&self, handle: &MessageHandle) -> TglfsResult<()> {
        self.gate("delete")?;
        self.inner.delete(handle).await
    }

    async fn forward(&self, handle: &MessageHandle, target: &str) -> TglfsResult<MessageHandle> {
        self.gate("forward")?;
        self.inner.forward(handle, target).await
    }

    async fn fetch_attachment(&self, handle: &MessageHandle, dest: &Path) -> TglfsResult<u64> {
        self.gate("fetch")?;
        self.inner.fetch_attachment(handle, dest).await
    }
}
