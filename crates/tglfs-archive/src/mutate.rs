//! Rename, delete, send and receive as per-message channel operations
//!
//! Each operation walks the matched chunk messages in ascending index order
//! and stops at the first channel failure. The channel cannot roll back, so
//! the error reports how far it got; re-running the operation finishes the
//! job (already-renamed chunks are renamed again, already-deleted ones are
//! no longer matched).

use std::time::Duration;

use tracing::{debug, info};

use tglfs_core::{FileFingerprint, TglfsError, TglfsResult};

use crate::caption;
use crate::index::Located;
use crate::Archive;

/// Pauses between batches of channel mutations to stay under rate limits.
struct Pacer {
    limit: usize,
    delay: Duration,
    done: usize,
}

impl Pacer {
    async fn tick(&mut self) {
        if self.done > 0 && self.done % self.limit == 0 && !self.delay.is_zero() {
            debug!(done = self.done, "batch limit reached, pausing {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
        }
        self.done += 1;
    }
}

fn partial(
    operation: &'static str,
    fingerprint: &FileFingerprint,
    applied: usize,
    total: usize,
    err: TglfsError,
) -> TglfsError {
    TglfsError::PartialMutation {
        operation,
        fingerprint: fingerprint.to_string(),
        applied,
        total,
        detail: err.to_string(),
    }
}

fn nothing_matched(fingerprint: &FileFingerprint) -> TglfsError {
    TglfsError::MissingChunk {
        fingerprint: fingerprint.to_string(),
        index: 1,
    }
}

/// One message per index, newest first among duplicates.
fn one_per_index(mut chunks: Vec<Located>) -> Vec<Located> {
    chunks.dedup_by_key(|l| l.chunk.chunk_index);
    chunks
}

impl Archive {
    fn pacer(&self) -> Pacer {
        let transfer = &self.config().transfer;
        Pacer {
            limit: transfer.batch_limit.max(1),
            delay: Duration::from_millis(transfer.batch_delay_ms),
            done: 0,
        }
    }

    /// Change the display name of every chunk of `fingerprint` in home.
    /// Returns the number of captions edited.
    pub async fn rename(&self, fingerprint: &FileFingerprint, new_name: &str) -> TglfsResult<usize> {
        if new_name.is_empty() {
            return Err(TglfsError::parse(new_name, "empty display name"));
        }
        let _guard = self.lock(fingerprint).await;
        let chunks = self.file_chunks(fingerprint, self.home()).await?;
        if chunks.is_empty() {
            return Err(nothing_matched(fingerprint));
        }

        let total = chunks.len();
        let mut pacer = self.pacer();
        for (applied, located) in chunks.iter().enumerate() {
            pacer.tick().await;
            let text = caption::with_name(&located.caption, new_name)
                .map_err(|e| partial("rename", fingerprint, applied, total, e))?;
            self.channel()
                .edit(&located.chunk.handle, &text)
                .await
                .map_err(|e| partial("rename", fingerprint, applied, total, e))?;
            debug!(fingerprint = %fingerprint, index = located.chunk.chunk_index, "caption renamed");
        }

        info!(fingerprint = %fingerprint, new_name, chunks = total, "rename complete");
        Ok(total)
    }

    /// Delete every chunk message of `fingerprint` in `source` (default:
    /// home). Deleting in a peer conversation "unsends" chunks sent there.
    /// Returns the number of messages deleted; 0 when nothing matched.
    pub async fn delete(&self, fingerprint: &FileFingerprint, source: Option<&str>) -> TglfsResult<usize> {
        let target = source.unwrap_or(self.home());
        let _guard = self.lock(fingerprint).await;
        let chunks = self.file_chunks(fingerprint, target).await?;

        let total = chunks.len();
        let mut pacer = self.pacer();
        for (applied, located) in chunks.iter().enumerate() {
            pacer.tick().await;
            self.channel()
                .delete(&located.chunk.handle)
                .await
                .map_err(|e| partial("delete", fingerprint, applied, total, e))?;
            debug!(fingerprint = %fingerprint, handle = %located.chunk.handle, "chunk deleted");
        }

        info!(fingerprint = %fingerprint, conversation = target, deleted = total, "delete complete");
        Ok(total)
    }

    /// Forward every chunk of `fingerprint` from home to `recipient`.
    pub async fn send(&self, fingerprint: &FileFingerprint, recipient: &str) -> TglfsResult<usize> {
        self.forward_file("send", fingerprint, self.home(), recipient)
            .await
    }

    /// Forward every chunk of `fingerprint` from `sender`'s conversation
    /// into home.
    pub async fn receive(&self, fingerprint: &FileFingerprint, sender: &str) -> TglfsResult<usize> {
        self.forward_file("receive", fingerprint, sender, self.home())
            .await
    }

    async fn forward_file(
        &self,
        operation: &'static str,
        fingerprint: &FileFingerprint,
        from: &str,
        to: &str,
    ) -> TglfsResult<usize> {
        let _guard = self.lock(fingerprint).await;
        let chunks = one_per_index(self.file_chunks(fingerprint, from).await?);
        if chunks.is_empty() {
            return Err(nothing_matched(fingerprint));
        }

        let total = chunks.len();
        let mut pacer = self.pacer();
        for (applied, located) in chunks.iter().enumerate() {
            pacer.tick().await;
            let copy = self
                .channel()
                .forward(&located.chunk.handle, to)
                .await
                .map_err(|e| partial(operation, fingerprint, applied, total, e))?;
            debug!(fingerprint = %fingerprint, index = located.chunk.chunk_index, to = %copy, "chunk forwarded");
        }

        info!(fingerprint = %fingerprint, from, to, chunks = total, "{operation} complete");
        Ok(total)
    }
}
