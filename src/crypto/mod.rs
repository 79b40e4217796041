//! Confidentiality and integrity primitives for framed payloads.
//!
//! - Password-based authenticated encryption (PBKDF2-HMAC-SHA256 + ChaCha20Poly1305)
//! - SHA-256 checksums and password hashes

pub mod hash;
pub mod symmetric;

pub use hash::{normalize_password, password_hash, sha256_hex};
pub use symmetric::{
    decrypt_symmetric, encrypt_symmetric, SymmetricError, ENCRYPTION_OVERHEAD, KDF_ROUNDS,
    NONCE_SIZE, SALT_SIZE, TAG_SIZE,
};
