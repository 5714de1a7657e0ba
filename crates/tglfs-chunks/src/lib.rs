//! tglfs-chunks: file identity, fixed-size chunking, and local chunk staging
//!
//! # Overview
//! - `identity`: SHA-256 fingerprint over display name + file bytes
//! - `split`: fixed-size 1-based chunk ranges (a zero-byte file is one chunk)
//! - `scratch`: staged chunk files removed on drop

pub mod identity;
pub mod scratch;
pub mod split;

// Convenience re-exports for the most common operations
pub use identity::{display_name, fingerprint, fingerprint_file, READ_WINDOW};
pub use scratch::{ScratchDir, ScratchFile};
pub use split::{chunk_count, chunk_range, read_chunk, split};
