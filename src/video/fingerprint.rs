//! Carrier fingerprints for staging-cache lookup.
//!
//! A fingerprint is the first 8 hex characters of
//! `sha256(sampled ‖ size_le ‖ mtime_le ‖ password)`, where `sampled` is four
//! 64 KiB windows taken at 0, 1/3, 2/3 and the end of the file. Files smaller
//! than the four windows are hashed whole.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::crypto::normalize_password;
use crate::error::StegoError;

/// Bytes read per sampling window.
pub const FINGERPRINT_WINDOW: u64 = 64 * 1024;

/// Hex characters kept from the digest.
pub const FINGERPRINT_HEX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CarrierFingerprint(pub(crate) String);

impl CarrierFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fingerprint of the file at `path` as it is now on disk.
    pub fn of_file(path: &Path, password: Option<&str>) -> Result<Self, StegoError> {
        let mut file = File::open(path)?;
        let meta = file.metadata()?;
        let size = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        if size <= 4 * FINGERPRINT_WINDOW {
            let mut all = Vec::with_capacity(size as usize);
            file.read_to_end(&mut all)?;
            hasher.update(&all);
        } else {
            let mut window = vec![0u8; FINGERPRINT_WINDOW as usize];
            for offset in window_offsets(size) {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut window)?;
                hasher.update(&window);
            }
        }
        hasher.update(size.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        hasher.update(normalize_password(password).unwrap_or("").as_bytes());

        let digest = hex::encode(hasher.finalize());
        Ok(Self(digest[..FINGERPRINT_HEX_LEN].to_string()))
    }
}

impl fmt::Display for CarrierFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Window start offsets for a file of `size` bytes.
fn window_offsets(size: u64) -> [u64; 4] {
    let last = size - FINGERPRINT_WINDOW;
    [0, (size / 3).min(last), (size * 2 / 3).min(last), last]
}
