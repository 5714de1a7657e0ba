//! tglfs-archive: chunked file storage over a messaging channel
//!
//! Files are split into fixed-size chunks, each sent as one message whose
//! caption ([`caption`]) names the file fingerprint, chunk position and
//! display name. Channel search over captions is the directory
//! ([`index`]); attachments are the block store. Storing resumes from
//! whatever chunks already exist ([`upload`]), retrieval reassembles in
//! order ([`download`]), and renames, deletes and transfers are per-message
//! edits, deletes and forwards ([`mutate`]).

pub mod caption;
pub mod download;
pub mod index;
pub mod mutate;
pub mod upload;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OwnedMutexGuard;

use tglfs_channel::Channel;
use tglfs_chunks::ScratchDir;
use tglfs_core::config::TglfsConfig;
use tglfs_core::FileFingerprint;
use tglfs_crypto::{ChunkCipher, KdfParams};

pub use caption::{CaptionVersion, ChunkCaption};
pub use download::RetrieveOutcome;
pub use index::{Directory, SkippedCaption};
pub use upload::StoreOutcome;

/// Progress callback type (done, total, message).
///
/// `store` reports plaintext bytes sent out of the file size; `retrieve`
/// reports chunks written out of the chunk count.
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// An archive session: one channel, one configuration, one scratch area.
///
/// Operations on the same fingerprint are serialized within this process;
/// different fingerprints proceed independently.
pub struct Archive {
    channel: Arc<dyn Channel>,
    config: TglfsConfig,
    scratch: ScratchDir,
    locks: Mutex<HashMap<FileFingerprint, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("home", &self.config.channel.home)
            .field("scratch", &self.scratch.root())
            .finish_non_exhaustive()
    }
}

impl Archive {
    pub fn new(channel: Arc<dyn Channel>, config: TglfsConfig, scratch: ScratchDir) -> Self {
        Self {
            channel,
            config,
            scratch,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    pub fn config(&self) -> &TglfsConfig {
        &self.config
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Conversation holding the own archive.
    pub fn home(&self) -> &str {
        &self.config.channel.home
    }

    /// Hold the per-fingerprint lock until the guard drops.
    pub(crate) async fn lock(&self, fingerprint: &FileFingerprint) -> FingerprintLock<'_> {
        let slot = {
            let mut table = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(fingerprint.clone()).or_default().clone()
        };
        FingerprintLock {
            archive: self,
            fingerprint: fingerprint.clone(),
            guard: Some(slot.lock_owned().await),
        }
    }

    /// Cipher for `password`, or `None` when chunks travel as plaintext.
    pub(crate) fn cipher(&self, password: Option<&SecretString>) -> Option<ChunkCipher> {
        let password = password.filter(|p| !p.expose_secret().is_empty())?;
        Some(ChunkCipher::new(
            SecretString::from(password.expose_secret().to_string()),
            KdfParams::from_config(&self.config.crypto),
        ))
    }
}

/// Held per-fingerprint lock. Dropping the last holder removes the table
/// entry, so the table only tracks fingerprints in use.
pub(crate) struct FingerprintLock<'a> {
    archive: &'a Archive,
    fingerprint: FileFingerprint,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FingerprintLock<'_> {
    fn drop(&mut self) {
        // Release the mutex (and its Arc) before checking for other holders
        drop(self.guard.take());
        let mut table = self.archive.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters clone the slot under this same table lock
        if table
            .get(&self.fingerprint)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            table.remove(&self.fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tglfs_channel::MailboxChannel;

    fn archive(dir: &std::path::Path) -> Archive {
        let channel = Arc::new(MailboxChannel::memory().unwrap());
        Archive::new(channel, TglfsConfig::default(), ScratchDir::new(dir).unwrap())
    }

    #[test]
    fn empty_password_means_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path());
        assert!(archive.cipher(None).is_none());
        assert!(archive.cipher(Some(&SecretString::from(String::new()))).is_none());
        assert!(archive.cipher(Some(&SecretString::from("pw".to_string()))).is_some());
    }

    #[tokio::test]
    async fn same_fingerprint_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path());
        let a: FileFingerprint = "aa".repeat(32).parse().unwrap();
        let b: FileFingerprint = "bb".repeat(32).parse().unwrap();

        let held = archive.lock(&a).await;
        // A different fingerprint is not blocked
        let _other = archive.lock(&b).await;
        let blocked = tokio::time::timeout(std::time::Duration::from_millis(50), archive.lock(&a)).await;
        assert!(blocked.is_err(), "second lock on the same fingerprint must wait");
        drop(held);
        let _again = archive.lock(&a).await;
    }

    #[tokio::test]
    async fn lock_table_forgets_released_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path());
        let table_len = |archive: &Archive| archive.locks.lock().unwrap().len();
        let a: FileFingerprint = "aa".repeat(32).parse().unwrap();
        let b: FileFingerprint = "bb".repeat(32).parse().unwrap();

        let held_a = archive.lock(&a).await;
        let held_b = archive.lock(&b).await;
        assert_eq!(table_len(&archive), 2);
        drop(held_b);
        assert_eq!(table_len(&archive), 1);

        // A waiter keeps the entry alive after the holder releases
        let waiter = archive.lock(&a);
        tokio::pin!(waiter);
        assert!(futures::poll!(waiter.as_mut()).is_pending());
        drop(held_a);
        let held_again = waiter.await;
        assert_eq!(table_len(&archive), 1);
        drop(held_again);
        assert_eq!(table_len(&archive), 0);
    }
}
