use thiserror::Error;

pub type TglfsResult<T> = Result<T, TglfsError>;

#[derive(Debug, Error)]
pub enum TglfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A channel round-trip failed. Already-sent messages stay where they are.
    #[error("channel {operation} failed: {detail}")]
    Channel { operation: &'static str, detail: String },

    #[error("cannot parse {text:?}: {reason}")]
    Parse { text: String, reason: String },

    #[error("inconsistent record {fingerprint}: {detail}")]
    Consistency { fingerprint: String, detail: String },

    #[error("decryption of chunk {index} failed: wrong password or corrupted chunk")]
    Decryption { index: u64 },

    #[error("chunk {index} of {fingerprint} not found")]
    MissingChunk { fingerprint: String, index: u64 },

    /// Some messages of a file were mutated and some were not.
    #[error("{operation} of {fingerprint} interrupted after {applied}/{total} chunks: {detail}")]
    PartialMutation {
        operation: &'static str,
        fingerprint: String,
        applied: usize,
        total: usize,
        detail: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TglfsError {
    pub fn channel(operation: &'static str, detail: impl std::fmt::Display) -> Self {
        TglfsError::Channel {
            operation,
            detail: detail.to_string(),
        }
    }

    pub fn parse(text: impl Into<String>, reason: impl Into<String>) -> Self {
        TglfsError::Parse {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub fn consistency(fingerprint: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        TglfsError::Consistency {
            fingerprint: fingerprint.to_string(),
            detail: detail.into(),
        }
    }

    /// True for failures a re-invocation of the same operation can get past.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            TglfsError::Channel { .. } | TglfsError::Io(_) | TglfsError::PartialMutation { .. }
        )
    }
}
