//! Error taxonomy for the payload codec.
//!
//! Every extraction failure maps to exactly one variant so callers can tell
//! "try a different password" apart from "this file has nothing hidden in it"
//! without string matching.

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::SymmetricError;
use crate::frame::FrameError;

/// Errors produced by the embedding and extraction pipeline.
#[derive(Error, Debug)]
pub enum StegoError {
    /// No valid magic header was located in the carrier.
    #[error("No hidden data found")]
    NotFound,

    /// Authenticated decryption failed or a layer's password hash did not match.
    #[error("Wrong password")]
    WrongPassword,

    /// The magic matched but the length fields or metadata are inconsistent.
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// The payload does not fit; raised before any carrier byte is modified.
    #[error(
        "Carrier too small: need {required_bits} bits, capacity is {capacity_bits} bits{}",
        .suggestion.as_deref().map(|s| format!(" ({s})")).unwrap_or_default()
    )]
    InsufficientCapacity {
        required_bits: usize,
        capacity_bits: usize,
        suggestion: Option<String>,
    },

    /// The append container already holds the maximum number of layers.
    #[error("Layer limit exceeded: a carrier holds at most {max} layers")]
    LayerLimitExceeded { max: usize },

    /// No staged representation exists for this video fingerprint.
    #[error("No staged frames for fingerprint {fingerprint}")]
    StagingCacheMiss { fingerprint: String },

    /// The carrier cannot hold the payload reliably (clipping, too many frames, ...).
    #[error("Carrier unsuitable: {0}")]
    CarrierUnsuitable(String),

    #[error("Unsupported carrier: {0}")]
    UnsupportedCarrier(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Video backend error: {0}")]
    Video(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StegoError {
    /// True when the carrier simply holds nothing this codec can find.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::StagingCacheMiss { .. })
    }

    /// True when data exists but the supplied password does not open it.
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, Self::WrongPassword)
    }
}

impl From<FrameError> for StegoError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::BadMagic => Self::NotFound,
            FrameError::DecryptionFailed | FrameError::PasswordRequired => Self::WrongPassword,
            FrameError::CorruptMetadata(msg) | FrameError::CorruptPayload(msg) => {
                Self::CorruptContainer(msg)
            }
            FrameError::Encryption(e) => Self::CorruptContainer(e.to_string()),
            FrameError::Serialization(e) => Self::Json(e),
        }
    }
}

impl From<SymmetricError> for StegoError {
    fn from(e: SymmetricError) -> Self {
        match e {
            SymmetricError::DecryptionFailed => Self::WrongPassword,
            other => Self::CorruptContainer(other.to_string()),
        }
    }
}

impl From<image::ImageError> for StegoError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

impl From<hound::Error> for StegoError {
    fn from(e: hound::Error) -> Self {
        Self::Audio(e.to_string())
    }
}
