//! Local scratch area for chunks in flight.
//!
//! A chunk only exists on local disk while it is being handed to (or fetched
//! from) the channel. `ScratchFile` owns that file and removes it on drop, so
//! every exit path, including `?` and panics, cleans up.
//!
//! Names are derived from fingerprint and index, so two in-flight chunks
//! never share a file.

use std::path::{Path, PathBuf};
use tracing::warn;

use tglfs_core::{FileFingerprint, TglfsResult};

/// Root directory for staged chunk files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use (and create if needed) `root` as the scratch area.
    pub fn new(root: impl Into<PathBuf>) -> TglfsResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an outgoing chunk to `<fingerprint>_<index>.chunk`.
    pub fn stage(
        &self,
        fingerprint: &FileFingerprint,
        index: u64,
        bytes: &[u8],
    ) -> TglfsResult<ScratchFile> {
        let guard = ScratchFile {
            path: self.root.join(format!("{fingerprint}_{index}.chunk")),
        };
        std::fs::write(&guard.path, bytes)?;
        Ok(guard)
    }

    /// Reserve `<fingerprint>_<index>.download` for an incoming attachment.
    pub fn reserve_download(&self, fingerprint: &FileFingerprint, index: u64) -> ScratchFile {
        ScratchFile {
            path: self.root.join(format!("{fingerprint}_{index}.download")),
        }
    }
}

/// A scratch file removed when dropped
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size on disk (0 if the file was never written).
    pub fn len(&self) -> TglfsResult<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> TglfsResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn read(&self) -> TglfsResult<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove scratch file: {e}"),
        }
    }
}
