//! # stegcodec - password-protected payloads inside media files
//!
//! Hides a text message or file inside an image, WAV file, video or any
//! other file, and recovers it later with the same password.
//!
//! ## Methods
//!
//! - **Pixel domain** (PNG/BMP/TIFF, video frames, optionally WAV samples):
//!   each payload bit is written `redundancy` times into sample LSBs, `spacing`
//!   sites apart, and read back by majority vote.
//! - **Transform domain** (WAV): sign coding of Haar wavelet detail
//!   coefficients in the middle of the signal.
//! - **Append container** (anything): up to five independently encrypted
//!   layers appended after the carrier's own data, with a trailing index.
//!
//! Every payload travels in the same frame: a magic tag, JSON metadata and the
//! (optionally ChaCha20-Poly1305 encrypted) payload. See [`frame`].
//!
//! ## Example
//!
//! ```no_run
//! use stegcodec::{CodecConfig, EmbedRequest, StegoCodec};
//!
//! let codec = StegoCodec::new(CodecConfig::default())?;
//! let report = codec.embed(
//!     &EmbedRequest::text("cover.png", "hello world").with_password("s3cret"),
//! )?;
//!
//! let found = codec.extract(&report.output_path, Some("s3cret"))?;
//! assert_eq!(found.payloads[0].text(), Some("hello world"));
//! # Ok::<(), stegcodec::StegoError>(())
//! ```
//!
//! Video carriers need `ffmpeg`/`ffprobe` on `PATH`; staged lossless frames
//! are cached under the user cache directory so lossy output stays readable.

pub mod capacity;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod layers;
pub mod plan;
pub mod stego;
pub mod video;

pub use codec::{
    CapacityReport, CarrierKind, EmbedReport, EmbedRequest, Extraction, PayloadSource,
    RecoveredPayload, StegoCodec,
};
pub use config::{CodecConfig, StagingConfig, TransformConfig};
pub use error::StegoError;
pub use frame::{frame, peek_header, unframe, FrameOptions, Integrity, Magic, Payload, Unframed};
pub use layers::{LayerDescriptor, MAX_LAYERS};
pub use plan::{EmbeddingPlan, LsbParams, Method, TransformParams};
pub use video::{StagingCache, VideoBackend, VideoCodec, VideoInfo};
