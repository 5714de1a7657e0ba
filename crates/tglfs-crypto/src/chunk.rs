//! Per-chunk XChaCha20-Poly1305 envelopes
//!
//! The AAD binds each chunk to its file fingerprint and 1-based index, so a
//! chunk swapped in from another position or another file fails to open
//! instead of producing wrong plaintext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use secrecy::SecretString;
use tracing::debug;

use tglfs_core::config::SaltMode;
use tglfs_core::{FileFingerprint, TglfsError, TglfsResult};

use crate::kdf::{derive_key, ChunkKey, KdfParams};
use crate::{FORMAT_EMBEDDED_SALT, FORMAT_STATIC_SALT, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Seals and opens chunk envelopes for one password.
pub struct ChunkCipher {
    password: SecretString,
    params: KdfParams,
    static_key: ChunkKey,
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCipher")
            .field("iterations", &self.params.iterations)
            .field("salt_mode", &self.params.salt_mode)
            .finish_non_exhaustive()
    }
}

impl ChunkCipher {
    /// Derive the static-salt key up front; per-chunk keys are derived on use.
    pub fn new(password: SecretString, params: KdfParams) -> Self {
        let static_key = derive_key(&password, &params.salt, params.iterations);
        Self {
            password,
            params,
            static_key,
        }
    }

    /// Encrypt one chunk. Output length is plaintext + overhead of the
    /// configured envelope format.
    pub fn seal(
        &self,
        fingerprint: &FileFingerprint,
        index: u64,
        plaintext: &[u8],
    ) -> TglfsResult<Vec<u8>> {
        let aad = build_aad(fingerprint, index);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let mut out = Vec::with_capacity(1 + SALT_SIZE + NONCE_SIZE + plaintext.len() + TAG_SIZE);
        let ciphertext = match self.params.salt_mode {
            SaltMode::Static => {
                out.push(FORMAT_STATIC_SALT);
                aead_seal(&self.static_key, &nonce_bytes, &aad, plaintext)?
            }
            SaltMode::PerChunk => {
                let mut salt = [0u8; SALT_SIZE];
                rand::thread_rng().fill_bytes(&mut salt);
                let key = derive_key(&self.password, &salt, self.params.iterations);
                out.push(FORMAT_EMBEDDED_SALT);
                out.extend_from_slice(&salt);
                aead_seal(&key, &nonce_bytes, &aad, plaintext)?
            }
        };
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt one chunk envelope. Any failure is a `Decryption` error for
    /// `index`; no partial plaintext is ever returned.
    pub fn open(
        &self,
        fingerprint: &FileFingerprint,
        index: u64,
        envelope: &[u8],
    ) -> TglfsResult<Vec<u8>> {
        let fail = || TglfsError::Decryption { index };
        let (&format, rest) = envelope.split_first().ok_or_else(fail)?;

        let derived;
        let (key, body) = match format {
            FORMAT_STATIC_SALT => (&self.static_key, rest),
            FORMAT_EMBEDDED_SALT => {
                if rest.len() < SALT_SIZE {
                    return Err(fail());
                }
                let (salt, body) = rest.split_at(SALT_SIZE);
                derived = derive_key(&self.password, salt, self.params.iterations);
                (&derived, body)
            }
            other => {
                debug!(index, format = other, "unknown chunk envelope format");
                return Err(fail());
            }
        };

        if body.len() < NONCE_SIZE + TAG_SIZE {
            return Err(fail());
        }
        let (nonce_bytes, ciphertext) = body.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let aad = build_aad(fingerprint, index);

        cipher
            .decrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| fail())
    }
}

fn aead_seal(
    key: &ChunkKey,
    nonce_bytes: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> TglfsResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| TglfsError::Other(anyhow::anyhow!("chunk encryption failed: {e}")))
}

/// Build AAD: fingerprint (32 bytes) || chunk_index (8 bytes BE)
fn build_aad(fingerprint: &FileFingerprint, index: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(32 + 8);
    aad.extend_from_slice(&fingerprint.to_bytes());
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}
