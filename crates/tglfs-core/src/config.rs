use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{TglfsError, TglfsResult};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Fixed salt shared by every installation unless overridden.
pub const DEFAULT_SALT: &str = "sweetspicyszechuanchickenratiobeetles";

/// Top-level configuration (loaded from tglfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TglfsConfig {
    pub channel: ChannelConfig,
    pub chunking: ChunkingConfig,
    pub scratch: ScratchConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
    pub download: DownloadConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelBackend {
    /// Mailbox stored in a local directory
    Fs,
    /// Mailbox stored in an S3-compatible bucket
    S3,
    /// Mailbox held in process memory (lost on exit)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub backend: ChannelBackend,
    /// Mailbox root directory (fs backend) or key prefix (s3 backend)
    pub root: PathBuf,
    /// Conversation holding the own archive
    pub home: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Fixed chunk size, decided at upload time (default: 2 GiB)
    pub chunk_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory for staged chunk files
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaltMode {
    /// Every chunk keyed with the configured salt
    Static,
    /// Random salt per chunk, embedded in the envelope
    PerChunk,
}

/// Password-based chunk encryption parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iterations (default: 100000)
    pub kdf_iterations: u32,
    /// Salt used in `static` mode
    pub salt: String,
    pub salt_mode: SaltMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Messages forwarded or deleted before pausing
    pub batch_limit: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStrategy {
    /// One scoped search per chunk index
    PerChunk,
    /// One search for the whole file, ordered locally
    SingleSweep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub strategy: DownloadStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::Fs,
            root: PathBuf::from("~/.local/share/tglfs/mailbox"),
            home: "me".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "tglfs".into(),
            enforce_tls: false,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 2 * GIB,
        }
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.cache/tglfs/scratch"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 100_000,
            salt: DEFAULT_SALT.into(),
            salt_mode: SaltMode::Static,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            batch_delay_ms: 1000,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            strategy: DownloadStrategy::PerChunk,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl TglfsConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> TglfsResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: TglfsConfig = toml::from_str(&content)
            .map_err(|e| TglfsError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the protocol cannot work with.
    pub fn validate(&self) -> TglfsResult<()> {
        if self.chunking.chunk_size_bytes == 0 {
            return Err(TglfsError::Config("chunking.chunk_size_bytes must be > 0".into()));
        }
        if self.crypto.kdf_iterations == 0 {
            return Err(TglfsError::Config("crypto.kdf_iterations must be > 0".into()));
        }
        if self.crypto.salt.is_empty() {
            return Err(TglfsError::Config("crypto.salt must not be empty".into()));
        }
        if self.transfer.batch_limit == 0 {
            return Err(TglfsError::Config("transfer.batch_limit must be > 0".into()));
        }
        if self.channel.home.trim().is_empty() {
            return Err(TglfsError::Config("channel.home must not be empty".into()));
        }
        Ok(())
    }
}
