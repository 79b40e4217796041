//! Self-describing payload frame.
//!
//! ```text
//! [8 bytes ] magic (embedded, layer 1..5, or legacy)
//! [4 bytes ] metadata length (big-endian u32)
//! [N bytes ] metadata JSON
//! [4 bytes ] payload length (big-endian u32)
//! [M bytes ] payload (plaintext, or salt || nonce || ciphertext)
//! [8 bytes ] end marker (append layers and legacy frames only)
//! ```
//!
//! The checksum in the metadata always covers the plaintext, so integrity can
//! be checked after decryption.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::{
    decrypt_symmetric, encrypt_symmetric, normalize_password, password_hash, sha256_hex,
    SymmetricError,
};

/// Length of every magic constant.
pub const MAGIC_LEN: usize = 8;

/// Magic for frames embedded inside carrier samples.
pub const EMBED_MAGIC: [u8; MAGIC_LEN] = *b"STGv2EMB";

/// Magic for the pre-layering single payload append format.
pub const LEGACY_MAGIC: [u8; MAGIC_LEN] = *b"STEGDATA";

/// Prefix shared by the per-layer magics `STGLYR1\n` .. `STGLYR5\n`.
pub const LAYER_MAGIC_PREFIX: &[u8; 6] = b"STGLYR";

/// Trailer closing append-mode frames and the layer index.
pub const END_MARKER: [u8; MAGIC_LEN] = *b"\0STGEND\0";

/// magic + metadata length + payload length.
pub const FIXED_HEADER_LEN: usize = MAGIC_LEN + 4 + 4;

/// Upper bound on the metadata block; anything larger is treated as corruption.
pub const MAX_METADATA_LEN: usize = 64 * 1024;

/// Highest layer number an append container can carry.
pub const MAX_LAYER_NUMBER: u8 = 5;

/// Identifies a frame's format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// Frame written into carrier samples or coefficients.
    Embedded,
    /// Append-container layer 1..=5.
    Layer(u8),
    /// Legacy single-layer append format (layer 0).
    Legacy,
}

impl Magic {
    pub fn bytes(&self) -> [u8; MAGIC_LEN] {
        match self {
            Magic::Embedded => EMBED_MAGIC,
            Magic::Legacy => LEGACY_MAGIC,
            Magic::Layer(n) => {
                let mut m = [0u8; MAGIC_LEN];
                m[..6].copy_from_slice(LAYER_MAGIC_PREFIX);
                m[6] = b'0' + n;
                m[7] = b'\n';
                m
            }
        }
    }

    /// Parses the first [`MAGIC_LEN`] bytes; `None` for short or unknown input.
    pub fn parse(bytes: &[u8]) -> Option<Magic> {
        let head = bytes.get(..MAGIC_LEN)?;
        if head == EMBED_MAGIC {
            return Some(Magic::Embedded);
        }
        if head == LEGACY_MAGIC {
            return Some(Magic::Legacy);
        }
        if &head[..6] == LAYER_MAGIC_PREFIX && head[7] == b'\n' {
            let n = head[6].wrapping_sub(b'0');
            if (1..=MAX_LAYER_NUMBER).contains(&n) {
                return Some(Magic::Layer(n));
            }
        }
        None
    }

    /// Append-mode frames carry a trailing [`END_MARKER`].
    pub fn has_end_marker(&self) -> bool {
        !matches!(self, Magic::Embedded)
    }

    pub fn layer_number(&self) -> u8 {
        match self {
            Magic::Layer(n) => *n,
            _ => 0,
        }
    }
}

/// Errors that can occur while framing or unframing.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Magic header not found")]
    BadMagic,

    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Authenticated decryption failed")]
    DecryptionFailed,

    #[error("Payload is encrypted but no password was supplied")]
    PasswordRequired,

    #[error("Encryption error: {0}")]
    Encryption(SymmetricError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller-supplied content to hide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub mime: Option<String>,
    /// Whether the data came from a file rather than typed text.
    pub is_file: bool,
}

impl Payload {
    pub fn text(text: &str) -> Self {
        Self {
            data: text.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    pub fn file(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: Some(filename.into()),
            mime: None,
            is_file: true,
        }
    }
}

/// Plaintext metadata stored in front of the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub original_size: u64,
    pub encrypted: bool,
    /// Hex SHA-256 of the plaintext payload.
    pub checksum: String,
    #[serde(default)]
    pub layer_number: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// Per-frame options that are not part of the payload itself.
#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub magic: Magic,
    pub carrier_ext: Option<String>,
    /// Assigned to append layers; `None` for embedded frames.
    pub layer_id: Option<Uuid>,
}

impl FrameOptions {
    pub fn embedded(carrier_ext: Option<String>) -> Self {
        Self {
            magic: Magic::Embedded,
            carrier_ext,
            layer_id: None,
        }
    }

    pub fn layer(number: u8, carrier_ext: Option<String>) -> Self {
        Self {
            magic: Magic::Layer(number),
            carrier_ext,
            layer_id: Some(Uuid::new_v4()),
        }
    }
}

/// Result of verifying the plaintext checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    Verified,
    /// Data is still returned; the caller decides whether to trust it.
    Mismatch { expected: String, actual: String },
}

/// A successfully parsed frame.
#[derive(Debug, Clone)]
pub struct Unframed {
    pub magic: Magic,
    pub payload: Vec<u8>,
    pub metadata: Metadata,
    pub integrity: Integrity,
    /// Total bytes consumed, including the end marker when present.
    pub frame_len: usize,
}

/// Builds a frame around `payload`, encrypting it when a password is given.
pub fn frame(
    payload: &Payload,
    password: Option<&str>,
    options: &FrameOptions,
) -> Result<Vec<u8>, FrameError> {
    let password = normalize_password(password);
    let checksum = sha256_hex(&payload.data);

    let body = match password {
        Some(pw) => encrypt_symmetric(&payload.data, pw).map_err(FrameError::Encryption)?,
        None => payload.data.clone(),
    };

    let is_layer = options.magic.has_end_marker();
    let metadata = Metadata {
        filename: payload.filename.clone(),
        original_size: payload.data.len() as u64,
        encrypted: password.is_some(),
        checksum,
        layer_number: options.magic.layer_number(),
        carrier_ext: options.carrier_ext.clone(),
        mime: payload.mime.clone(),
        is_file: payload.is_file,
        layer_id: options.layer_id,
        password_hash: if is_layer { password.map(password_hash) } else { None },
    };
    let meta_json = serde_json::to_vec(&metadata)?;
    if meta_json.len() > MAX_METADATA_LEN {
        return Err(FrameError::CorruptMetadata(format!(
            "metadata too large: {} bytes",
            meta_json.len()
        )));
    }

    let mut out = Vec::with_capacity(FIXED_HEADER_LEN + meta_json.len() + body.len() + MAGIC_LEN);
    out.extend_from_slice(&options.magic.bytes());
    out.extend_from_slice(&length_field(meta_json.len(), "metadata")?);
    out.extend_from_slice(&meta_json);
    out.extend_from_slice(&length_field(body.len(), "payload")?);
    out.extend_from_slice(&body);
    if is_layer {
        out.extend_from_slice(&END_MARKER);
    }

    Ok(out)
}

/// Big-endian `u32` length prefix; lengths past `u32::MAX` are rejected.
fn length_field(len: usize, what: &str) -> Result<[u8; 4], FrameError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| FrameError::CorruptPayload(format!("{what} too large for frame: {len} bytes")))
}

/// Layout of a frame whose header has been parsed but whose body has not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub magic: Magic,
    pub metadata_len: usize,
    pub payload_len: usize,
}

impl FrameLayout {
    pub fn metadata_range(&self) -> std::ops::Range<usize> {
        let start = MAGIC_LEN + 4;
        start..start + self.metadata_len
    }

    pub fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.metadata_range().end + 4;
        start..start + self.payload_len
    }

    pub fn total_len(&self) -> usize {
        let marker = if self.magic.has_end_marker() { MAGIC_LEN } else { 0 };
        self.payload_range().end + marker
    }
}

/// Reads just enough of `bytes` to learn the metadata length.
///
/// Returns `BadMagic` for short or unknown input.
pub fn peek_metadata_len(bytes: &[u8]) -> Result<(Magic, usize), FrameError> {
    let magic = Magic::parse(bytes).ok_or(FrameError::BadMagic)?;
    let len_bytes: [u8; 4] = bytes
        .get(MAGIC_LEN..MAGIC_LEN + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| FrameError::CorruptMetadata("truncated metadata length".into()))?;
    let metadata_len = u32::from_be_bytes(len_bytes) as usize;
    if metadata_len > MAX_METADATA_LEN {
        return Err(FrameError::CorruptMetadata(format!(
            "declared metadata length {metadata_len} exceeds limit"
        )));
    }
    Ok((magic, metadata_len))
}

/// Parses the header fields (both lengths) without touching the payload.
///
/// `bytes` must extend at least to the payload length field.
pub fn peek_layout(bytes: &[u8]) -> Result<FrameLayout, FrameError> {
    let (magic, metadata_len) = peek_metadata_len(bytes)?;
    let len_at = MAGIC_LEN + 4 + metadata_len;
    let len_bytes: [u8; 4] = bytes
        .get(len_at..len_at + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| FrameError::CorruptMetadata("metadata length overruns buffer".into()))?;
    Ok(FrameLayout {
        magic,
        metadata_len,
        payload_len: u32::from_be_bytes(len_bytes) as usize,
    })
}

/// Magic and total declared frame length (end marker included), or `None`
/// when `bytes` does not start with a readable header. Never decrypts.
pub fn peek_header(bytes: &[u8]) -> Option<(Magic, usize)> {
    let layout = peek_layout(bytes).ok()?;
    Some((layout.magic, layout.total_len()))
}

/// Parses only the metadata block of a frame.
pub fn read_metadata(bytes: &[u8]) -> Result<(FrameLayout, Metadata), FrameError> {
    let layout = peek_layout(bytes)?;
    let metadata: Metadata = serde_json::from_slice(&bytes[layout.metadata_range()])
        .map_err(|e| FrameError::CorruptMetadata(e.to_string()))?;
    Ok((layout, metadata))
}

/// Parses and, when needed, decrypts a frame.
///
/// A checksum mismatch is not an error: the data is returned with
/// [`Integrity::Mismatch`] and a warning is logged.
pub fn unframe(bytes: &[u8], password: Option<&str>) -> Result<Unframed, FrameError> {
    let password = normalize_password(password);
    let (layout, metadata) = read_metadata(bytes)?;

    let body = bytes.get(layout.payload_range()).ok_or_else(|| {
        FrameError::CorruptPayload(format!(
            "declared payload length {} overruns buffer of {} bytes",
            layout.payload_len,
            bytes.len()
        ))
    })?;

    if layout.magic.has_end_marker() {
        let end = layout.payload_range().end;
        if bytes.get(end..end + MAGIC_LEN) != Some(&END_MARKER[..]) {
            return Err(FrameError::CorruptPayload("missing end marker".into()));
        }
    }

    let payload = if metadata.encrypted {
        let pw = password.ok_or(FrameError::PasswordRequired)?;
        decrypt_symmetric(body, pw).map_err(|e| match e {
            SymmetricError::CiphertextTooShort(n) => {
                FrameError::CorruptPayload(format!("ciphertext too short: {n} bytes"))
            }
            _ => FrameError::DecryptionFailed,
        })?
    } else {
        body.to_vec()
    };

    let actual = sha256_hex(&payload);
    let integrity = if actual.eq_ignore_ascii_case(&metadata.checksum) {
        Integrity::Verified
    } else {
        warn!(
            expected = %metadata.checksum,
            actual = %actual,
            "checksum mismatch; returning data anyway"
        );
        Integrity::Mismatch {
            expected: metadata.checksum.clone(),
            actual,
        }
    };

    Ok(Unframed {
        magic: layout.magic,
        payload,
        metadata,
        integrity,
        frame_len: layout.total_len(),
    })
}
