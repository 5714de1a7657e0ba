//! SHA-256 file fingerprinting
//!
//! The fingerprint covers the display name followed by the file content, so
//! the same bytes stored under two names are two different archive entries.
//! Content is streamed in fixed windows; memory use does not grow with file
//! size.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use tglfs_core::{FileFingerprint, TglfsError, TglfsResult};

/// Read window for streaming hashes (1 MiB)
pub const READ_WINDOW: usize = 1024 * 1024;

/// Fingerprint a byte stream under a display name, in a single pass.
pub fn fingerprint<R: Read>(display_name: &str, mut reader: R) -> TglfsResult<FileFingerprint> {
    let mut hasher = Sha256::new();
    hasher.update(display_name.as_bytes());

    let mut buf = vec![0u8; READ_WINDOW];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }

    hex::encode(hasher.finalize()).parse()
}

/// Fingerprint a file on disk; its basename is the display name.
pub fn fingerprint_file(path: &Path) -> TglfsResult<FileFingerprint> {
    let name = display_name(path)?;
    let file = std::fs::File::open(path)?;
    fingerprint(&name, file)
}

/// The name a file is archived under: its final path component.
pub fn display_name(path: &Path) -> TglfsResult<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        return Err(TglfsError::parse(
            path.display().to_string(),
            "path has no file name",
        ));
    }
    Ok(name)
}
