pub mod config;
pub mod error;
pub mod types;

pub use error::{TglfsError, TglfsResult};
pub use types::{ChunkMessage, FileFingerprint, FileRecord, MessageHandle, FINGERPRINT_HEX_LEN};
