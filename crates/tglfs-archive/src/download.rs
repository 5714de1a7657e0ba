//! Retrieve: locate chunks in index order, decrypt, reassemble
//!
//! Output goes to a part file beside the destination and is renamed into
//! place only after the last chunk is written. Any failure removes the part
//! file, so a destination path never holds a partial or undecryptable file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use tglfs_core::config::DownloadStrategy;
use tglfs_core::{ChunkMessage, FileFingerprint, FileRecord, TglfsError, TglfsResult};

use crate::index::{fold, Located};
use crate::{caption, Archive, ProgressFn};

/// Result of retrieving a single file
#[derive(Debug, Clone)]
pub struct RetrieveOutcome {
    pub record: FileRecord,
    pub destination: PathBuf,
    pub bytes_written: u64,
}

/// The temporary output file, removed unless committed.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    fn beside(destination: &Path) -> Self {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tglfs-part");
        Self {
            path: destination.with_file_name(name),
            committed: false,
        }
    }

    async fn commit(mut self, destination: &Path) -> TglfsResult<()> {
        tokio::fs::rename(&self.path, destination).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove part file: {e}"),
        }
    }
}

impl Archive {
    /// Reassemble the file `fingerprint` from the home conversation into
    /// `destination`, decrypting when `password` is non-empty.
    pub async fn retrieve(
        &self,
        fingerprint: &FileFingerprint,
        destination: &Path,
        password: Option<&SecretString>,
        progress: Option<&ProgressFn>,
    ) -> TglfsResult<RetrieveOutcome> {
        let _guard = self.lock(fingerprint).await;
        let home = self.home();

        let sweep = self.file_chunks(fingerprint, home).await?;
        let record = fold(&sweep).ok_or_else(|| TglfsError::MissingChunk {
            fingerprint: fingerprint.to_string(),
            index: 1,
        })?;
        record.verify_consistent()?;

        let strategy = self.config().download.strategy;
        // single_sweep reuses the resolving search; newest message wins per index
        let mut swept: BTreeMap<u64, ChunkMessage> = BTreeMap::new();
        if strategy == DownloadStrategy::SingleSweep {
            for located in sweep {
                swept.entry(located.chunk.chunk_index).or_insert(located.chunk);
            }
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = PartFile::beside(destination);
        let mut out = tokio::fs::File::create(&part.path).await?;

        let cipher = self.cipher(password);
        let count = record.chunk_count;
        let mut bytes_written = 0u64;

        for index in 1..=count {
            let chunk = match strategy {
                DownloadStrategy::SingleSweep => swept.remove(&index),
                DownloadStrategy::PerChunk => self.locate_chunk(&record, index).await?,
            }
            .ok_or_else(|| TglfsError::MissingChunk {
                fingerprint: fingerprint.to_string(),
                index,
            })?;

            let fetched = self.scratch().reserve_download(fingerprint, index);
            self.channel()
                .fetch_attachment(&chunk.handle, fetched.path())
                .await?;
            let raw = fetched.read()?;
            drop(fetched);

            let plain = match &cipher {
                Some(c) => c.open(fingerprint, index, &raw)?,
                None => raw,
            };
            out.write_all(&plain).await?;
            bytes_written += plain.len() as u64;

            debug!(fingerprint = %fingerprint, index, count, "chunk written");
            if let Some(cb) = progress {
                cb(index, count, &format!("chunk {index}/{count}"));
            }
        }

        out.flush().await?;
        out.sync_all().await?;
        drop(out);
        part.commit(destination).await?;

        info!(
            fingerprint = %fingerprint,
            dest = %destination.display(),
            bytes = bytes_written,
            "retrieve complete"
        );
        Ok(RetrieveOutcome {
            record,
            destination: destination.to_path_buf(),
            bytes_written,
        })
    }

    /// One scoped search for chunk `index`. Full-text matching is fuzzy
    /// (`2/30` also matches inside `12/30`), so results are decoded and
    /// filtered for the exact fingerprint and index.
    async fn locate_chunk(&self, record: &FileRecord, index: u64) -> TglfsResult<Option<ChunkMessage>> {
        let query = caption::chunk_query(
            &record.fingerprint,
            index,
            record.chunk_count,
            &record.display_name,
        );
        let (found, _) = self
            .search_chunks(self.home(), &query, Some(&record.fingerprint))
            .await?;
        Ok(found
            .into_iter()
            .map(|Located { chunk, .. }| chunk)
            .find(|c| c.chunk_index == index))
    }
}
