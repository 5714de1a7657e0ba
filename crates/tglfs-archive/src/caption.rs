//! Chunk captions: the self-describing text attached to every chunk message.
//!
//! v1 wire format:
//! ```text
//! tglfs <64 hex fingerprint> chunk <index>/<count> <display name>
//! 0    5 6                 70 71  76 77
//! ```
//! Everything up to byte 77 has a fixed width, and `<index>/<count>` ends at
//! the first space after it. The display name is the verbatim remainder, so
//! names with spaces, slashes, or the word `chunk` decode unambiguously.
//!
//! Captions double as search keys: the channel's full-text search over
//! captions is the only directory the archive has.

use serde::{Deserialize, Serialize};

use tglfs_core::{FileFingerprint, TglfsError, TglfsResult, FINGERPRINT_HEX_LEN};

/// Tag of the current caption format
pub const TAG_V1: &str = "tglfs";

const FP_START: usize = TAG_V1.len() + 1;
const FP_END: usize = FP_START + FINGERPRINT_HEX_LEN;
const LITERAL: &str = "chunk";
const LITERAL_START: usize = FP_END + 1;
const LITERAL_END: usize = LITERAL_START + LITERAL.len();
const RATIO_START: usize = LITERAL_END + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptionVersion {
    /// `tglfs <fp> chunk <i>/<n> <name>`
    V1,
}

impl CaptionVersion {
    pub fn tag(self) -> &'static str {
        match self {
            CaptionVersion::V1 => TAG_V1,
        }
    }
}

/// A decoded chunk caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCaption {
    pub version: CaptionVersion,
    pub fingerprint: FileFingerprint,
    /// 1-based
    pub index: u64,
    pub count: u64,
    pub name: String,
}

impl ChunkCaption {
    pub fn new(
        fingerprint: FileFingerprint,
        index: u64,
        count: u64,
        name: impl Into<String>,
    ) -> TglfsResult<Self> {
        let caption = ChunkCaption {
            version: CaptionVersion::V1,
            fingerprint,
            index,
            count,
            name: name.into(),
        };
        caption.check()?;
        Ok(caption)
    }

    fn check(&self) -> TglfsResult<()> {
        if self.name.is_empty() {
            return Err(TglfsError::parse(self.encode_unchecked(), "empty display name"));
        }
        if self.index == 0 || self.index > self.count {
            return Err(TglfsError::parse(
                self.encode_unchecked(),
                format!("chunk index {} outside 1..={}", self.index, self.count),
            ));
        }
        Ok(())
    }

    fn encode_unchecked(&self) -> String {
        format!(
            "{} {} {LITERAL} {}/{} {}",
            self.version.tag(),
            self.fingerprint,
            self.index,
            self.count,
            self.name
        )
    }

    pub fn encode(&self) -> String {
        self.encode_unchecked()
    }
}

/// Encode a caption, rejecting empty names and out-of-range indices.
pub fn encode(fingerprint: &FileFingerprint, index: u64, count: u64, name: &str) -> TglfsResult<String> {
    Ok(ChunkCaption::new(fingerprint.clone(), index, count, name)?.encode())
}

/// Decode a caption of any known version.
pub fn decode(text: &str) -> TglfsResult<ChunkCaption> {
    let tag = text.split(' ').next().unwrap_or_default();
    match tag {
        TAG_V1 => decode_v1(text),
        _ => Err(TglfsError::parse(text, format!("unknown caption tag {tag:?}"))),
    }
}

fn decode_v1(text: &str) -> TglfsResult<ChunkCaption> {
    let bytes = text.as_bytes();
    let err = |reason: &str| TglfsError::parse(text, reason);

    if bytes.len() <= RATIO_START {
        return Err(err("caption too short"));
    }
    if bytes[FP_START - 1] != b' ' || bytes[FP_END] != b' ' || bytes[LITERAL_END] != b' ' {
        return Err(err("malformed field separators"));
    }
    let fingerprint: FileFingerprint = text
        .get(FP_START..FP_END)
        .ok_or_else(|| err("fingerprint is not ASCII"))?
        .parse()
        .map_err(|_| err("bad fingerprint"))?;
    if text.get(LITERAL_START..LITERAL_END) != Some(LITERAL) {
        return Err(err("missing literal `chunk`"));
    }

    // RATIO_START follows an ASCII space, so it is a char boundary
    let rest = &text[RATIO_START..];
    let (ratio, name) = rest
        .split_once(' ')
        .ok_or_else(|| err("missing display name"))?;
    let (index, count) = ratio
        .split_once('/')
        .ok_or_else(|| err("malformed index/count"))?;
    let index = parse_decimal(index).ok_or_else(|| err("malformed chunk index"))?;
    let count = parse_decimal(count).ok_or_else(|| err("malformed chunk count"))?;

    if name.is_empty() {
        return Err(err("empty display name"));
    }
    if index == 0 || index > count {
        return Err(err("chunk index out of range"));
    }

    Ok(ChunkCaption {
        version: CaptionVersion::V1,
        fingerprint,
        index,
        count,
        name: name.to_string(),
    })
}

/// Plain ASCII digits only: no sign, no whitespace.
fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Replace the display name, keeping the prefix byte-identical.
pub fn with_name(text: &str, new_name: &str) -> TglfsResult<String> {
    if new_name.is_empty() {
        return Err(TglfsError::parse(new_name, "empty display name"));
    }
    let decoded = decode(text)?;
    let prefix = &text[..text.len() - decoded.name.len()];
    Ok(format!("{prefix}{new_name}"))
}

/// Search string for a directory lookup by `term`.
pub fn lookup_query(term: &str) -> String {
    format!("{TAG_V1} {term} {LITERAL}")
}

/// Search string matching every chunk of one file.
pub fn fingerprint_query(fingerprint: &FileFingerprint) -> String {
    lookup_query(fingerprint.as_str())
}

/// Search string scoped to a single chunk.
pub fn chunk_query(fingerprint: &FileFingerprint, index: u64, count: u64, name: &str) -> String {
    format!("{TAG_V1} {fingerprint} {LITERAL} {index}/{count} {name}")
}
