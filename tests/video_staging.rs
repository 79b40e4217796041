//! Video embedding through the staging cache.
//!
//! `RawFrameBackend` stands in for ffmpeg: a "video" is a small header plus
//! raw RGB frames. It can refuse codecs and damage every sample LSB when a
//! lossy codec is chosen, which is what makes the staging cache necessary.

use std::fs;
use std::path::Path;

use image::RgbImage;
use tempfile::TempDir;

use stegcodec::video::cache::frame_file_name;
use stegcodec::{
    CodecConfig, EmbedRequest, EmbeddingPlan, Method, StagingCache, StegoCodec, StegoError,
    VideoBackend, VideoCodec, VideoInfo,
};

const MAGIC: &[u8; 8] = b"RAWVID01";
const HEADER_LEN: usize = 8 + 4 + 4 + 4 + 8;

#[derive(Default)]
struct RawFrameBackend {
    rejected: Vec<VideoCodec>,
    lossy: bool,
}

impl RawFrameBackend {
    fn lossy_only() -> Self {
        Self {
            rejected: vec![VideoCodec::Ffv1, VideoCodec::Libx264Rgb, VideoCodec::Png],
            lossy: true,
        }
    }
}

fn read_header(bytes: &[u8]) -> Result<VideoInfo, StegoError> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(StegoError::Video("not a raw video".into()));
    }
    let u32_at = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
    Ok(VideoInfo {
        width: u32_at(8),
        height: u32_at(12),
        frame_count: u32_at(16) as usize,
        fps: f64::from_le_bytes(bytes[20..28].try_into().unwrap()),
    })
}

fn write_video(path: &Path, info: &VideoInfo, frames: &[Vec<u8>]) {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&info.width.to_le_bytes());
    out.extend_from_slice(&info.height.to_le_bytes());
    out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&info.fps.to_le_bytes());
    for frame in frames {
        out.extend_from_slice(frame);
    }
    fs::write(path, out).unwrap();
}

impl VideoBackend for RawFrameBackend {
    fn probe(&self, path: &Path) -> Result<VideoInfo, StegoError> {
        read_header(&fs::read(path)?)
    }

    fn decode_frames(&self, path: &Path, out_dir: &Path, max_frames: usize) -> Result<usize, StegoError> {
        let bytes = fs::read(path)?;
        let info = read_header(&bytes)?;
        let frame_len = info.samples_per_frame();
        let count = info.frame_count.min(max_frames);
        for i in 0..count {
            let start = HEADER_LEN + i * frame_len;
            let raw = bytes[start..start + frame_len].to_vec();
            let img = RgbImage::from_raw(info.width, info.height, raw)
                .ok_or_else(|| StegoError::Video("short frame".into()))?;
            img.save(out_dir.join(frame_file_name(i)))?;
        }
        Ok(count)
    }

    fn encode(&self, frames_dir: &Path, fps: f64, codec: VideoCodec, out: &Path) -> Result<(), StegoError> {
        if self.rejected.contains(&codec) {
            return Err(StegoError::Video(format!("{codec} unavailable")));
        }
        let mut frames = Vec::new();
        let mut size = (0, 0);
        for path in StagingCache::frame_paths(frames_dir)? {
            let img = image::open(&path)?.to_rgb8();
            size = img.dimensions();
            let mut raw = img.into_raw();
            if self.lossy && !codec.is_lossless() {
                raw.iter_mut().for_each(|b| *b ^= 1);
            }
            frames.push(raw);
        }
        let info = VideoInfo {
            width: size.0,
            height: size.1,
            frame_count: frames.len(),
            fps,
        };
        write_video(out, &info, &frames);
        Ok(())
    }
}

fn make_clip(path: &Path, width: u32, height: u32, count: usize) -> VideoInfo {
    let info = VideoInfo {
        width,
        height,
        frame_count: count,
        fps: 25.0,
    };
    let frames: Vec<Vec<u8>> = (0..count)
        .map(|f| {
            (0..info.samples_per_frame())
                .map(|i| ((i * 13 + f * 29) % 251) as u8)
                .collect()
        })
        .collect();
    write_video(path, &info, &frames);
    info
}

fn codec_with(backend: RawFrameBackend, staging: &Path) -> StegoCodec {
    let mut config = CodecConfig::default();
    config.staging.dir = Some(staging.to_path_buf());
    StegoCodec::with_backend(config, Box::new(backend), StagingCache::new(staging))
}

#[test]
fn test_lossless_roundtrip_prefers_ffv1() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.mp4");
    make_clip(&clip, 32, 24, 10);
    let codec = codec_with(RawFrameBackend::default(), &dir.path().join("staging"));

    let report = codec
        .embed(&EmbedRequest::text(&clip, "frames hold this").with_password("reel"))
        .unwrap();
    assert_eq!(report.method, Method::PixelDomain);
    match report.plan {
        EmbeddingPlan::PixelDomain {
            frames_used,
            capacity_bits,
            ..
        } => {
            assert!(frames_used >= 1 && frames_used < 10);
            assert_eq!(capacity_bits, 10 * 32 * 24);
        }
        ref other => panic!("unexpected plan {other:?}"),
    }

    let entries = codec.cache().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sidecar.codec.as_deref(), Some("ffv1"));
    assert_eq!(entries[0].sidecar.total_frames, 10);

    let found = codec.extract(&report.output_path, Some("reel")).unwrap();
    assert_eq!(found.payloads[0].text(), Some("frames hold this"));
}

#[test]
fn test_lossy_output_recovered_from_staging() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.mp4");
    make_clip(&clip, 32, 24, 10);
    let codec = codec_with(RawFrameBackend::lossy_only(), &dir.path().join("staging"));

    let report = codec
        .embed(&EmbedRequest::text(&clip, "survives mjpeg").with_password("reel"))
        .unwrap();
    let entries = codec.cache().entries().unwrap();
    assert_eq!(entries[0].sidecar.codec.as_deref(), Some("mjpeg"));

    let found = codec.extract(&report.output_path, Some("reel")).unwrap();
    assert_eq!(found.payloads[0].text(), Some("survives mjpeg"));

    // Without the staged frames the damaged file holds nothing readable.
    let cold = codec_with(RawFrameBackend::lossy_only(), &dir.path().join("empty"));
    let err = cold.extract(&report.output_path, Some("reel")).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, StegoError::StagingCacheMiss { ref fingerprint } if fingerprint.len() == 8));
}

#[test]
fn test_wrong_password_on_lossy_video() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.mp4");
    make_clip(&clip, 32, 24, 10);
    let codec = codec_with(RawFrameBackend::lossy_only(), &dir.path().join("staging"));

    let report = codec
        .embed(&EmbedRequest::text(&clip, "only for reel").with_password("reel"))
        .unwrap();

    // The staged frames are found by geometry but refuse the password.
    let err = codec.extract(&report.output_path, Some("wrong")).unwrap_err();
    assert!(err.is_wrong_password(), "got {err}");

    let found = codec.extract(&report.output_path, Some("reel")).unwrap();
    assert_eq!(found.payloads[0].text(), Some("only for reel"));
}

#[test]
fn test_reencoded_copy_uses_fallback_candidates() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.mp4");
    make_clip(&clip, 32, 24, 10);
    let codec = codec_with(RawFrameBackend::lossy_only(), &dir.path().join("staging"));

    let report = codec
        .embed(&EmbedRequest::text(&clip, "found by geometry").with_password("reel"))
        .unwrap();

    // Same geometry, different bytes: the fingerprint no longer matches.
    let mut bytes = fs::read(&report.output_path).unwrap();
    bytes[HEADER_LEN..].iter_mut().for_each(|b| *b ^= 2);
    let copy = dir.path().join("reshared.mp4");
    fs::write(&copy, bytes).unwrap();

    let found = codec.extract(&copy, Some("reel")).unwrap();
    assert_eq!(found.payloads[0].text(), Some("found by geometry"));
}

#[test]
fn test_direct_decode_of_lossless_video() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("clip.mkv");
    make_clip(&clip, 32, 24, 6);
    let warm = codec_with(RawFrameBackend::default(), &dir.path().join("staging"));
    let report = warm
        .embed(&EmbedRequest::text(&clip, "no cache needed").with_password("reel"))
        .unwrap();

    let cold = codec_with(RawFrameBackend::default(), &dir.path().join("empty"));
    let found = cold.extract(&report.output_path, Some("reel")).unwrap();
    assert_eq!(found.payloads[0].text(), Some("no cache needed"));

    let err = cold.extract(&report.output_path, Some("cut")).unwrap_err();
    assert!(err.is_wrong_password(), "got {err}");
}

#[test]
fn test_video_too_small_is_rejected_before_staging() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("tiny.avi");
    make_clip(&clip, 8, 8, 2);
    let staging = dir.path().join("staging");
    let codec = codec_with(RawFrameBackend::default(), &staging);

    let capacity = codec.capacity(&clip, None).unwrap();
    assert_eq!(capacity.plan.capacity_bits(), Some(2 * 8 * 8));

    let err = codec
        .embed(&EmbedRequest::text(&clip, &"x".repeat(200)).with_password("reel"))
        .unwrap_err();
    match err {
        StegoError::InsufficientCapacity { suggestion, .. } => {
            assert!(suggestion.unwrap().contains("frames at 8x8"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!dir.path().join("tiny_stego.avi").exists());
    assert!(codec.cache().entries().unwrap().is_empty());
}
