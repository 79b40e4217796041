//! Video carriers.
//!
//! Frames are decoded to PNG in a staging directory, the payload is LSB
//! embedded across them as one [`FrameStack`], and the result is re-encoded.
//! Because delivery codecs may not preserve LSBs, extraction first looks up
//! the staged frames by the delivered file's fingerprint, then tries
//! geometrically similar staged entries, and only then decodes the file
//! itself.

pub mod cache;
pub mod ffmpeg;
pub mod fingerprint;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::capacity::{ensure_fits, pixel_capacity_bits, suggest_video_frames};
use crate::error::StegoError;
use crate::frame::{unframe, Unframed};
use crate::plan::LsbParams;
use crate::stego::lsb::{self, Located};
use crate::stego::samples::PIXEL_CHANNELS;
use crate::stego::FrameStack;

pub use cache::{match_score, StagedEntry, StagingCache, StagingSidecar};
pub use ffmpeg::FfmpegBackend;
pub use fingerprint::CarrierFingerprint;

/// Frames decoded when reading a delivered file directly.
pub const MAX_SCAN_FRAMES: usize = 600;

/// Properties reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub fps: f64,
}

impl VideoInfo {
    pub fn samples_per_frame(&self) -> usize {
        self.width as usize * self.height as usize * PIXEL_CHANNELS
    }
}

/// Delivery codecs, tried in [`VideoCodec::FALLBACK_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    Ffv1,
    /// Lossless H.264 in RGB.
    Libx264Rgb,
    Png,
    /// Lossy; extraction then depends on the staging cache.
    Mjpeg,
}

impl VideoCodec {
    pub const FALLBACK_ORDER: [VideoCodec; 4] = [
        VideoCodec::Ffv1,
        VideoCodec::Libx264Rgb,
        VideoCodec::Png,
        VideoCodec::Mjpeg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Ffv1 => "ffv1",
            VideoCodec::Libx264Rgb => "libx264rgb",
            VideoCodec::Png => "png",
            VideoCodec::Mjpeg => "mjpeg",
        }
    }

    pub fn is_lossless(&self) -> bool {
        !matches!(self, VideoCodec::Mjpeg)
    }

    /// Encoder arguments placed between the input and the output path.
    pub fn ffmpeg_args(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::Ffv1 => &["-c:v", "ffv1", "-pix_fmt", "bgr0"],
            VideoCodec::Libx264Rgb => &["-c:v", "libx264rgb", "-qp", "0", "-pix_fmt", "rgb24"],
            VideoCodec::Png => &["-c:v", "png", "-pix_fmt", "rgb24"],
            VideoCodec::Mjpeg => &["-c:v", "mjpeg", "-q:v", "2", "-pix_fmt", "yuvj444p"],
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoding and encoding of video files.
pub trait VideoBackend {
    fn probe(&self, path: &Path) -> Result<VideoInfo, StegoError>;

    /// Writes at most `max_frames` frames to `out_dir` as
    /// `frame_000001.png`, ... and returns how many were written.
    fn decode_frames(&self, path: &Path, out_dir: &Path, max_frames: usize) -> Result<usize, StegoError>;

    /// Encodes the PNG frames of `frames_dir` into `out`.
    fn encode(&self, frames_dir: &Path, fps: f64, codec: VideoCodec, out: &Path) -> Result<(), StegoError>;
}

/// Encodes with the first codec that works.
pub fn encode_with_fallback<B: VideoBackend + ?Sized>(
    backend: &B,
    frames_dir: &Path,
    fps: f64,
    out: &Path,
) -> Result<VideoCodec, StegoError> {
    let mut last_error = None;
    for codec in VideoCodec::FALLBACK_ORDER {
        match backend.encode(frames_dir, fps, codec, out) {
            Ok(()) => {
                info!(codec = %codec, lossless = codec.is_lossless(), "video encoded");
                return Ok(codec);
            }
            Err(e) => {
                debug!(codec = %codec, error = %e, "codec unavailable, trying next");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| StegoError::Video("no codec available".into())))
}

/// Outcome of a video embed.
#[derive(Debug, Clone)]
pub struct VideoEmbedOutcome {
    pub codec: VideoCodec,
    pub frames_used: usize,
    pub capacity_bits: usize,
    pub fingerprint: CarrierFingerprint,
    pub info: VideoInfo,
}

/// Video embedding and extraction through a backend and a staging cache.
pub struct VideoStego<'a, B: VideoBackend + ?Sized> {
    backend: &'a B,
    cache: &'a StagingCache,
    max_frames: usize,
}

impl<'a, B: VideoBackend + ?Sized> VideoStego<'a, B> {
    pub fn new(backend: &'a B, cache: &'a StagingCache, max_frames: usize) -> Self {
        Self {
            backend,
            cache,
            max_frames,
        }
    }

    /// Capacity of `path` in framed bits, from a probe only.
    pub fn capacity(&self, path: &Path, params: &LsbParams) -> Result<(VideoInfo, usize), StegoError> {
        let info = self.backend.probe(path)?;
        let frames = info.frame_count.min(self.max_frames);
        Ok((info, pixel_capacity_bits(frames * info.samples_per_frame(), params)))
    }

    /// Embeds `framed` into `input` and writes the re-encoded video to `output`.
    pub fn embed(
        &self,
        input: &Path,
        output: &Path,
        framed: &[u8],
        params: &LsbParams,
        password: Option<&str>,
    ) -> Result<VideoEmbedOutcome, StegoError> {
        let required = framed.len() * 8;
        let (info, capacity) = self.capacity(input, params)?;
        let suggest = || {
            format!(
                "use a video with at least {} frames at {}x{}",
                suggest_video_frames(required, info.width, info.height, params),
                info.width,
                info.height
            )
        };
        ensure_fits(required, capacity, suggest)?;

        let base = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let pending = self.cache.begin(base)?;
        let decoded = self.backend.decode_frames(input, pending.dir(), self.max_frames)?;
        let capacity = pixel_capacity_bits(decoded * info.samples_per_frame(), params);
        ensure_fits(required, capacity, suggest)?;

        let per_frame = info.samples_per_frame().max(1);
        let frames_used = params.samples_needed(framed.len()).div_ceil(per_frame);
        let paths = StagingCache::frame_paths(pending.dir())?;
        let mut stack = StagingCache::load_frames(pending.dir(), Some(frames_used))?;
        if stack.samples_per_frame() != info.samples_per_frame() {
            return Err(StegoError::Video(format!(
                "decoded frames do not match probed size {}x{}",
                info.width, info.height
            )));
        }
        lsb::embed(&mut stack, params, framed)?;
        for (frame, path) in stack.into_frames().iter().zip(&paths) {
            frame.save(path)?;
        }

        let codec = encode_with_fallback(self.backend, pending.dir(), info.fps, output)?;
        let fingerprint = CarrierFingerprint::of_file(output, password)?;
        let sidecar = StagingSidecar {
            width: info.width,
            height: info.height,
            total_frames: decoded,
            fps: info.fps,
            fingerprint: fingerprint.as_str().to_string(),
            created_at: chrono::Utc::now(),
            codec: Some(codec.name().to_string()),
        };
        self.cache.commit(pending, &sidecar)?;

        Ok(VideoEmbedOutcome {
            codec,
            frames_used,
            capacity_bits: capacity,
            fingerprint,
            info,
        })
    }

    /// Recovers the payload of `path`.
    ///
    /// Order: exact fingerprint hit, fallback candidates (each validated by a
    /// full decrypt), direct decode of the file. A staged frame that was
    /// found but refused the password is reported as `WrongPassword` when
    /// nothing else yields a payload.
    pub fn extract(&self, path: &Path, password: Option<&str>, preferred: &LsbParams) -> Result<Unframed, StegoError> {
        let fingerprint = CarrierFingerprint::of_file(path, password)?;
        let mut rejected: Option<StegoError> = None;

        if let Some(entry) = self.cache.lookup(&fingerprint)? {
            match read_staged(&entry.dir, password, preferred) {
                Ok(unframed) => {
                    debug!(fingerprint = %fingerprint, "staging cache hit");
                    return Ok(unframed);
                }
                Err(e) if e.is_wrong_password() => {
                    debug!(dir = %entry.dir.display(), "staged entry refused password");
                    rejected.get_or_insert(e);
                }
                Err(e) => warn!(dir = %entry.dir.display(), error = %e, "staged entry unreadable"),
            }
        }

        let info = self.backend.probe(path)?;
        for entry in self.cache.fallback_candidates(&info)? {
            match read_staged(&entry.dir, password, preferred) {
                Ok(unframed) => {
                    info!(dir = %entry.dir.display(), "payload recovered from fallback staging entry");
                    return Ok(unframed);
                }
                Err(e) => {
                    debug!(dir = %entry.dir.display(), error = %e, "fallback candidate rejected");
                    if e.is_wrong_password() {
                        rejected.get_or_insert(e);
                    }
                }
            }
        }

        let scratch = tempfile::tempdir()?;
        let decoded = self
            .backend
            .decode_frames(path, scratch.path(), MAX_SCAN_FRAMES.min(self.max_frames))?;
        if decoded > 0 {
            match read_staged(scratch.path(), password, preferred) {
                Ok(unframed) => return Ok(unframed),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Err(rejected.unwrap_or_else(|| StegoError::StagingCacheMiss {
            fingerprint: fingerprint.to_string(),
        }))
    }
}

/// Reads a frame from the PNG frames in `dir`, loading only as many frames
/// as the located header asks for.
fn read_staged(dir: &Path, password: Option<&str>, preferred: &LsbParams) -> Result<Unframed, StegoError> {
    let available = StagingCache::frame_paths(dir)?.len();
    if available == 0 {
        return Err(StegoError::NotFound);
    }

    let first = StagingCache::load_frames(dir, Some(1))?;
    let initial = head_frames(&first, preferred).min(available);
    let mut stack = StagingCache::load_frames(dir, Some(initial))?;

    loop {
        match lsb::locate(&stack, preferred)? {
            Located::Found { frame, .. } => return Ok(unframe(&frame, password)?),
            Located::NeedMore { samples_required, .. } => {
                let needed = stack.frames_spanned(samples_required);
                if needed > available || needed <= stack.len() {
                    return Err(StegoError::CorruptContainer(format!(
                        "frame needs {needed} frames, {available} staged"
                    )));
                }
                stack = StagingCache::load_frames(dir, Some(needed))?;
            }
        }
    }
}

/// Frames needed for every blind candidate to read the fixed header.
fn head_frames(first: &FrameStack, preferred: &LsbParams) -> usize {
    let head = crate::frame::MAGIC_LEN + 4;
    let samples = lsb::candidate_params(preferred)
        .iter()
        .map(|p| p.samples_needed(head))
        .max()
        .unwrap_or(0);
    first.frames_spanned(samples).max(1)
}
