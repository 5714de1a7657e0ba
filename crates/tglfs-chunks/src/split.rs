//! Fixed-size chunking
//!
//! A file of `S` bytes split at chunk size `C` has `max(1, ceil(S / C))`
//! chunks, numbered from 1. The last chunk may be short; an empty file is a
//! single empty chunk so every stored file has at least one message.
//!
//! Chunks are read on demand by seeking, which lets an interrupted upload
//! restart at any index without touching earlier ranges.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tglfs_core::{TglfsError, TglfsResult};

/// Number of chunks for a file of `file_size` bytes.
///
/// Panics if `chunk_size` is zero; config validation rejects that earlier.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    assert!(chunk_size > 0, "chunk_size must be positive");
    file_size.div_ceil(chunk_size).max(1)
}

/// Byte range `(offset, length)` covered by the 1-based chunk `index`, or
/// `None` when `index` is outside `1..=chunk_count(file_size, chunk_size)`.
pub fn chunk_range(index: u64, chunk_size: u64, file_size: u64) -> Option<(u64, u64)> {
    if index == 0 || index > chunk_count(file_size, chunk_size) {
        return None;
    }
    let offset = (index - 1) * chunk_size;
    let length = file_size.saturating_sub(offset).min(chunk_size);
    Some((offset, length))
}

/// Chunk count of a file on disk.
pub fn split(path: &Path, chunk_size: u64) -> TglfsResult<u64> {
    if chunk_size == 0 {
        return Err(TglfsError::Config("chunk size must be > 0".into()));
    }
    let size = std::fs::metadata(path)?.len();
    Ok(chunk_count(size, chunk_size))
}

/// Read the 1-based chunk `index` of `path`.
pub fn read_chunk(path: &Path, index: u64, chunk_size: u64) -> TglfsResult<Vec<u8>> {
    if chunk_size == 0 {
        return Err(TglfsError::Config("chunk size must be > 0".into()));
    }
    let file_size = std::fs::metadata(path)?.len();
    let (offset, length) = chunk_range(index, chunk_size, file_size).ok_or_else(|| {
        TglfsError::Other(anyhow::anyhow!(
            "chunk index {index} out of range 1..={} for {}",
            chunk_count(file_size, chunk_size),
            path.display()
        ))
    })?;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::with_capacity(length as usize);
    file.take(length).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn write_file(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, data).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_file_is_one_chunk() {
        assert_eq!(chunk_count(0, 1024), 1);
        let (_dir, path) = write_file(b"");
        assert_eq!(split(&path, 1024).unwrap(), 1);
        assert_eq!(read_chunk(&path, 1, 1024).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        assert_eq!(chunk_count(4096, 1024), 4);
        assert_eq!(chunk_count(4097, 1024), 5);
        assert_eq!(chunk_range(5, 1024, 4097), Some((4096, 1)));
    }

    #[test]
    fn range_rejects_out_of_bounds_index() {
        assert_eq!(chunk_range(0, 1024, 4096), None);
        assert_eq!(chunk_range(5, 1024, 4096), None);
        assert_eq!(chunk_range(1, 1024, 0), Some((0, 0)));
        assert_eq!(chunk_range(4, 1024, 4096), Some((3072, 1024)));
    }

    #[test]
    fn read_middle_chunk() {
        let (_dir, path) = write_file(b"Hello, World!");
        assert_eq!(read_chunk(&path, 2, 5).unwrap(), b", Wor");
        assert_eq!(read_chunk(&path, 3, 5).unwrap(), b"ld!");
    }

    #[test]
    fn out_of_range_index_fails() {
        let (_dir, path) = write_file(b"Hello, World!");
        assert!(read_chunk(&path, 0, 5).is_err());
        assert!(read_chunk(&path, 4, 5).is_err());
    }

    #[test]
    fn missing_file_fails_with_io() {
        let err = split(Path::new("path/to/nonexistent/file.txt"), 1024).unwrap_err();
        assert!(matches!(err, TglfsError::Io(_)));
    }

    #[test]
    fn zero_chunk_size_is_config_error() {
        let (_dir, path) = write_file(b"x");
        assert!(matches!(split(&path, 0), Err(TglfsError::Config(_))));
    }

    proptest! {
        #[test]
        fn count_matches_ceiling(size in 0u64..1_000_000, chunk in 1u64..10_000) {
            let expected = if size == 0 { 1 } else { size.div_ceil(chunk) };
            prop_assert_eq!(chunk_count(size, chunk), expected);
        }

        /// Chunks read back in order reproduce the original bytes exactly
        #[test]
        fn chunks_reassemble(
            data in proptest::collection::vec(any::<u8>(), 0..=8192),
            chunk in 1u64..=3000,
        ) {
            let (_dir, path) = write_file(&data);
            let n = split(&path, chunk).unwrap();
            let mut joined = Vec::new();
            for i in 1..=n {
                let part = read_chunk(&path, i, chunk).unwrap();
                prop_assert!(part.len() as u64 <= chunk);
                joined.extend_from_slice(&part);
            }
            prop_assert_eq!(joined, data);
        }
    }
}
