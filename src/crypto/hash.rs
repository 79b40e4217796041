//! SHA-256 helpers for checksums and layer password hashes.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash stored in a layer descriptor so a layer can be matched to a password
/// without attempting decryption.
pub fn password_hash(password: &str) -> String {
    sha256_hex(password.as_bytes())
}

/// Treats an empty password the same as no password.
pub fn normalize_password(password: Option<&str>) -> Option<&str> {
    password.filter(|p| !p.is_empty())
}
