//! Key derivation: PBKDF2-HMAC-SHA256 password → chunk key

use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use tglfs_core::config::{CryptoConfig, SaltMode};

use crate::KEY_SIZE;

/// A 256-bit chunk encryption key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct ChunkKey {
    bytes: [u8; KEY_SIZE],
}

impl ChunkKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ChunkKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 100000)
    pub iterations: u32,
    /// Salt for static-salt envelopes
    pub salt: Vec<u8>,
    /// Which envelope format new chunks are sealed with
    pub salt_mode: SaltMode,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from_config(&CryptoConfig::default())
    }
}

impl KdfParams {
    pub fn from_config(cfg: &CryptoConfig) -> Self {
        Self {
            iterations: cfg.kdf_iterations,
            salt: cfg.salt.as_bytes().to_vec(),
            salt_mode: cfg.salt_mode,
        }
    }
}

/// Derive a 256-bit key from a password and salt with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &SecretString, salt: &[u8], iterations: u32) -> ChunkKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    ChunkKey::from_bytes(key)
}
