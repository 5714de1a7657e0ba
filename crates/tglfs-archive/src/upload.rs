//! Resumable store: fingerprint → probe existing chunks → upload the rest
//!
//! The channel has no transactions, so an interrupted store leaves a prefix
//! (or any subset) of chunk messages behind. Storing the same file again
//! probes what is already present and sends only the missing indices, which
//! makes `store` idempotent.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::SecretString;
use tracing::{debug, info};

use tglfs_chunks::{display_name, fingerprint_file, read_chunk, split};
use tglfs_core::{ChunkMessage, FileRecord, TglfsError, TglfsResult};

use crate::index::fold;
use crate::{caption, Archive, ProgressFn};

/// Result of storing a single file
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub record: FileRecord,
    /// Chunks sent by this call (0 if the file was already complete)
    pub uploaded: u64,
    /// First index sent when earlier chunks already existed
    pub resumed_from: Option<u64>,
}

impl Archive {
    /// Store `path` in the home conversation, encrypting when `password` is
    /// non-empty.
    ///
    /// Chunk messages already present for this fingerprint are kept; a
    /// failed send aborts with the failing index and the next call resumes.
    pub async fn store(
        &self,
        path: &Path,
        password: Option<&SecretString>,
        progress: Option<&ProgressFn>,
    ) -> TglfsResult<StoreOutcome> {
        let chunk_size = self.config().chunking.chunk_size_bytes;
        let name = display_name(path)?;
        let fingerprint = fingerprint_file(path)?;
        let count = split(path, chunk_size)?;
        let file_size = std::fs::metadata(path)?.len();
        let started = unix_now();

        let _guard = self.lock(&fingerprint).await;
        let home = self.home();

        // Probe
        let existing = self.file_chunks(&fingerprint, home).await?;
        let divergent: BTreeSet<u64> = existing
            .iter()
            .map(|l| l.chunk.chunk_count)
            .filter(|&n| n != count)
            .collect();
        if !divergent.is_empty() {
            return Err(TglfsError::consistency(
                &fingerprint,
                format!(
                    "stored chunks declare chunk counts {divergent:?} but the file splits into {count} \
                     (was chunking.chunk_size_bytes changed?)"
                ),
            ));
        }

        let mut record = fold(&existing);
        // Keep an earlier rename when completing a partial store
        let caption_name = record
            .as_ref()
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| name.clone());
        let missing: Vec<u64> = match &record {
            Some(r) => r.missing_indices(),
            None => (1..=count).collect(),
        };
        let resumed_from = match (&record, missing.first()) {
            (Some(_), Some(&first)) => Some(first),
            _ => None,
        };
        if let Some(first) = resumed_from {
            info!(
                fingerprint = %fingerprint,
                present = count - missing.len() as u64,
                count,
                "resuming store from chunk {first}"
            );
        }

        let cipher = self.cipher(password);
        let mut bytes_done = 0u64;
        for &index in &missing {
            let plain = read_chunk(path, index, chunk_size)?;
            let plain_len = plain.len() as u64;
            let payload = match &cipher {
                Some(c) => c.seal(&fingerprint, index, &plain)?,
                None => plain,
            };
            let text = caption::encode(&fingerprint, index, count, &caption_name)?;

            let staged = self.scratch().stage(&fingerprint, index, &payload)?;
            let handle = self
                .channel()
                .send(home, &text, staged.path())
                .await
                .map_err(|e| at_chunk(e, index, count))?;
            drop(staged);

            let chunk = ChunkMessage {
                fingerprint: fingerprint.clone(),
                chunk_index: index,
                chunk_count: count,
                display_name: caption_name.clone(),
                attachment_size: payload.len() as u64,
                timestamp: started,
                handle,
            };
            match record.as_mut() {
                Some(r) => r.absorb(&chunk),
                None => record = Some(FileRecord::from_chunk(&chunk)),
            }

            bytes_done += plain_len;
            debug!(fingerprint = %fingerprint, index, count, size = chunk.attachment_size, "chunk sent");
            if let Some(cb) = progress {
                cb(bytes_done, file_size, &format!("chunk {index}/{count}"));
            }
        }

        let record = record.ok_or_else(|| {
            // count >= 1, so either a chunk existed or one was just sent
            TglfsError::consistency(&fingerprint, "no chunk messages after store")
        })?;
        info!(
            fingerprint = %fingerprint,
            name = %record.display_name,
            chunks = count,
            uploaded = missing.len(),
            "store complete"
        );

        Ok(StoreOutcome {
            record,
            uploaded: missing.len() as u64,
            resumed_from,
        })
    }
}

/// Attach the failing chunk position to a channel error.
fn at_chunk(err: TglfsError, index: u64, count: u64) -> TglfsError {
    match err {
        TglfsError::Channel { operation, detail } => TglfsError::Channel {
            operation,
            detail: format!("chunk {index}/{count}: {detail}"),
        },
        other => other,
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
