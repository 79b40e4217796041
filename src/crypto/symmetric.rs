//! Password-based authenticated encryption.
//!
//! - PBKDF2-HMAC-SHA256 (100,000 rounds, random 16-byte salt) for key derivation
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Output layout: `salt (16) || nonce (12) || ciphertext (includes 16-byte tag)`

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// PBKDF2 iteration count.
pub const KDF_ROUNDS: u32 = 100_000;

/// Salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// Nonce size for ChaCha20Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Bytes added to the plaintext by [`encrypt_symmetric`].
pub const ENCRYPTION_OVERHEAD: usize = SALT_SIZE + NONCE_SIZE + TAG_SIZE;

const KEY_SIZE: usize = 32;

/// Errors that can occur during symmetric encryption.
#[derive(Error, Debug)]
pub enum SymmetricError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Tag verification failed. This is the wrong-password signal.
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("Invalid ciphertext: too short ({0} bytes)")]
    CiphertextTooShort(usize),
}

/// Derives a 256-bit key from a password and salt.
fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ROUNDS, &mut *key);
    key
}

/// Encrypts data with a password.
pub fn encrypt_symmetric(plaintext: &[u8], password: &str) -> Result<Vec<u8>, SymmetricError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt);
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| SymmetricError::EncryptionFailed(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| SymmetricError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypts data produced by [`encrypt_symmetric`].
///
/// Fails closed with [`SymmetricError::DecryptionFailed`] on tag mismatch.
pub fn decrypt_symmetric(data: &[u8], password: &str) -> Result<Vec<u8>, SymmetricError> {
    if data.len() < ENCRYPTION_OVERHEAD {
        return Err(SymmetricError::CiphertextTooShort(data.len()));
    }

    let (salt, rest) = data.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let key = derive_key(password, salt);
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|_| SymmetricError::DecryptionFailed)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| SymmetricError::DecryptionFailed)
}
