use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{TglfsError, TglfsResult};

/// Length of a fingerprint in hex characters (SHA-256)
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Content+name identity of a stored file: lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileFingerprint(String);

impl FileFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw 32 digest bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // Validated on construction, so decoding cannot fail.
        let _ = hex::decode_to_slice(&self.0, &mut out);
        out
    }

    /// Abbreviated form for human-facing output
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl FromStr for FileFingerprint {
    type Err = TglfsError;

    fn from_str(s: &str) -> TglfsResult<Self> {
        if s.len() != FINGERPRINT_HEX_LEN {
            return Err(TglfsError::parse(
                s,
                format!("fingerprint must be {FINGERPRINT_HEX_LEN} hex chars, got {}", s.len()),
            ));
        }
        if !s.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(TglfsError::parse(s, "fingerprint must be lowercase hex"));
        }
        Ok(FileFingerprint(s.to_string()))
    }
}

impl TryFrom<String> for FileFingerprint {
    type Error = TglfsError;

    fn try_from(value: String) -> TglfsResult<Self> {
        value.parse()
    }
}

impl From<FileFingerprint> for String {
    fn from(fp: FileFingerprint) -> String {
        fp.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one message inside one conversation of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Conversation the message lives in ("me" for the own archive)
    pub target: String,
    /// Channel-assigned id, increasing with send order
    pub id: u64,
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.target, self.id)
    }
}

/// One stored chunk as seen through the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub fingerprint: FileFingerprint,
    /// 1-based
    pub chunk_index: u64,
    pub chunk_count: u64,
    pub display_name: String,
    pub attachment_size: u64,
    /// Unix seconds, as reported by the channel
    pub timestamp: u64,
    pub handle: MessageHandle,
}

/// A logical file folded from the chunk messages sharing a fingerprint.
///
/// Never persisted: rebuilt from channel search results on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub fingerprint: FileFingerprint,
    pub display_name: String,
    /// Sum of attachment sizes seen (ciphertext size when encrypted)
    pub total_stored_size: u64,
    pub chunk_count: u64,
    /// Minimum timestamp over constituent messages
    pub earliest_timestamp: u64,
    /// Chunk indices observed
    pub present: BTreeSet<u64>,
    /// Chunk counts that disagree with `chunk_count`
    pub divergent_counts: BTreeSet<u64>,
    /// Display names that disagree with `display_name` (an interrupted rename)
    pub divergent_names: BTreeSet<String>,
    /// Number of messages whose index was already observed
    pub duplicates: u64,
}

impl FileRecord {
    /// Start a record from its first observed chunk.
    pub fn from_chunk(chunk: &ChunkMessage) -> Self {
        let mut record = FileRecord {
            fingerprint: chunk.fingerprint.clone(),
            display_name: chunk.display_name.clone(),
            total_stored_size: 0,
            chunk_count: chunk.chunk_count,
            earliest_timestamp: chunk.timestamp,
            present: BTreeSet::new(),
            divergent_counts: BTreeSet::new(),
            divergent_names: BTreeSet::new(),
            duplicates: 0,
        };
        record.absorb(chunk);
        record
    }

    /// Fold one more chunk message into this record.
    pub fn absorb(&mut self, chunk: &ChunkMessage) {
        debug_assert_eq!(chunk.fingerprint, self.fingerprint);
        self.total_stored_size += chunk.attachment_size;
        self.earliest_timestamp = self.earliest_timestamp.min(chunk.timestamp);
        if chunk.chunk_count != self.chunk_count {
            self.divergent_counts.insert(chunk.chunk_count);
        }
        if chunk.display_name != self.display_name {
            self.divergent_names.insert(chunk.display_name.clone());
        }
        if !self.present.insert(chunk.chunk_index) {
            self.duplicates += 1;
        }
    }

    /// Indices in `1..=chunk_count` not yet observed, ascending.
    pub fn missing_indices(&self) -> Vec<u64> {
        (1..=self.chunk_count)
            .filter(|i| !self.present.contains(i))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.divergent_counts.is_empty()
            && self.divergent_names.is_empty()
            && self.missing_indices().is_empty()
    }

    /// Fail with a consistency error if chunk counts or display names
    /// disagree across chunks.
    pub fn verify_consistent(&self) -> TglfsResult<()> {
        if !self.divergent_counts.is_empty() {
            return Err(TglfsError::consistency(
                &self.fingerprint,
                format!(
                    "chunk count {} disagrees with {:?} seen on other chunks",
                    self.chunk_count, self.divergent_counts
                ),
            ));
        }
        if !self.divergent_names.is_empty() {
            return Err(TglfsError::consistency(
                &self.fingerprint,
                format!(
                    "display name {:?} disagrees with {:?} seen on other chunks \
                     (re-run the rename to finish it)",
                    self.display_name, self.divergent_names
                ),
            ));
        }
        Ok(())
    }

    /// Fail with a consistency error unless every chunk is present exactly
    /// under one agreed chunk count.
    pub fn verify_complete(&self) -> TglfsResult<()> {
        self.verify_consistent()?;
        let missing = self.missing_indices();
        if missing.is_empty() {
            return Ok(());
        }
        Err(TglfsError::consistency(
            &self.fingerprint,
            format!("missing chunks {missing:?} of {}", self.chunk_count),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> FileFingerprint {
        "0f".repeat(32).parse().unwrap()
    }

    fn chunk(index: u64, count: u64, size: u64, timestamp: u64) -> ChunkMessage {
        ChunkMessage {
            fingerprint: fp(),
            chunk_index: index,
            chunk_count: count,
            display_name: "report.pdf".into(),
            attachment_size: size,
            timestamp,
            handle: MessageHandle {
                target: "me".into(),
                id: index,
            },
        }
    }

    #[test]
    fn fingerprint_parse_rejects_bad_input() {
        assert!("abc".parse::<FileFingerprint>().is_err());
        assert!("AB".repeat(32).parse::<FileFingerprint>().is_err());
        assert!("zz".repeat(32).parse::<FileFingerprint>().is_err());
        assert!("ab".repeat(32).parse::<FileFingerprint>().is_ok());
    }

    #[test]
    fn fingerprint_bytes() {
        let fp: FileFingerprint = format!("00ff10{}", "a".repeat(58)).parse().unwrap();
        let bytes = fp.to_bytes();
        assert_eq!(&bytes[..3], &[0x00, 0xff, 0x10]);
        assert_eq!(bytes[31], 0xaa);
        assert_eq!(hex::encode(bytes), fp.as_str());
    }

    #[test]
    fn record_aggregates_size_and_earliest_timestamp() {
        let mut record = FileRecord::from_chunk(&chunk(1, 3, 10, 100));
        record.absorb(&chunk(2, 3, 20, 50));
        record.absorb(&chunk(3, 3, 30, 200));

        assert_eq!(record.total_stored_size, 60);
        assert_eq!(record.earliest_timestamp, 50);
        assert!(record.is_complete());
        record.verify_complete().unwrap();
    }

    #[test]
    fn record_reports_gaps() {
        let mut record = FileRecord::from_chunk(&chunk(1, 4, 1, 1));
        record.absorb(&chunk(3, 4, 1, 1));

        assert_eq!(record.missing_indices(), vec![2, 4]);
        let err = record.verify_complete().unwrap_err();
        assert!(matches!(err, TglfsError::Consistency { .. }));
    }

    #[test]
    fn record_flags_divergent_counts_and_duplicates() {
        let mut record = FileRecord::from_chunk(&chunk(1, 2, 1, 1));
        record.absorb(&chunk(2, 3, 1, 1));
        record.absorb(&chunk(1, 2, 1, 1));

        assert_eq!(record.divergent_counts.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(record.duplicates, 1);
        assert!(record.verify_consistent().is_err());
    }

    #[test]
    fn record_flags_divergent_names() {
        let mut record = FileRecord::from_chunk(&chunk(1, 2, 1, 1));
        let mut renamed = chunk(2, 2, 1, 1);
        renamed.display_name = "final.pdf".into();
        record.absorb(&renamed);

        assert_eq!(record.display_name, "report.pdf");
        assert!(record.divergent_names.contains("final.pdf"));
        assert!(record.missing_indices().is_empty());
        assert!(!record.is_complete());
        let err = record.verify_complete().unwrap_err();
        assert!(matches!(err, TglfsError::Consistency { .. }));
    }

    #[test]
    fn fingerprint_serde_validates() {
        let ok: Result<FileFingerprint, _> = serde_json::from_str(&format!("\"{}\"", "1".repeat(64)));
        assert!(ok.is_ok());
        let bad: Result<FileFingerprint, _> = serde_json::from_str("\"nothex\"");
        assert!(bad.is_err());
    }
}
