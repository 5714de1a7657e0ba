//! tglfs-crypto: optional password-based encryption of stored chunks
//!
//! Pipeline: plaintext chunk → PBKDF2-SHA256 key → XChaCha20-Poly1305 seal → stage → send
//!
//! Envelope layout:
//! ```text
//! format 0x01 (static salt):    [0x01][24-byte nonce][ciphertext][16-byte tag]
//! format 0x02 (per-chunk salt): [0x02][16-byte salt][24-byte nonce][ciphertext][16-byte tag]
//! AAD = fingerprint (32 bytes) || chunk_index (8 bytes, big-endian)
//! ```
//!
//! The format byte tells the reader which key to use, so archives written in
//! either mode stay readable after `salt_mode` changes.

pub mod chunk;
pub mod kdf;

pub use chunk::ChunkCipher;
pub use kdf::{derive_key, ChunkKey, KdfParams};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of an embedded per-chunk salt
pub const SALT_SIZE: usize = 16;

/// Envelope keyed with the configured static salt
pub const FORMAT_STATIC_SALT: u8 = 0x01;

/// Envelope carrying its own random salt
pub const FORMAT_EMBEDDED_SALT: u8 = 0x02;
