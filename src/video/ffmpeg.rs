//! [`VideoBackend`] that shells out to `ffprobe` and `ffmpeg`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

use crate::error::StegoError;

use super::cache::StagingCache;
use super::{VideoBackend, VideoCodec, VideoInfo};

/// Frame file pattern passed to ffmpeg; matches [`super::cache::frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%06d.png";

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_read_packets: Option<String>,
    nb_frames: Option<String>,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn run(&self, program: &Path, args: &[&str]) -> Result<Output, StegoError> {
        debug!(program = %program.display(), ?args, "running");
        let output = Command::new(program).args(args).output().map_err(|e| {
            StegoError::Video(format!("failed to run {}: {e}", program.display()))
        })?;
        if !output.status.success() {
            return Err(StegoError::Video(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

/// Parses ffprobe's `num/den` rate notation.
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then_some(num.parse::<f64>().ok()? / den)
        }
        None => rate.parse().ok(),
    }
}

fn path_arg(path: &Path) -> Result<&str, StegoError> {
    path.to_str()
        .ok_or_else(|| StegoError::Video(format!("non UTF-8 path: {}", path.display())))
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoInfo, StegoError> {
        let output = self.run(
            &self.ffprobe,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_packets",
                "-show_entries",
                "stream=width,height,r_frame_rate,nb_read_packets,nb_frames",
                "-of",
                "json",
                path_arg(path)?,
            ],
        )?;
        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = parsed
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| StegoError::Video(format!("no video stream in {}", path.display())))?;

        let frame_count = stream
            .nb_read_packets
            .or(stream.nb_frames)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok(VideoInfo {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            frame_count,
            fps: stream.r_frame_rate.as_deref().and_then(parse_rate).unwrap_or(0.0),
        })
    }

    fn decode_frames(&self, path: &Path, out_dir: &Path, max_frames: usize) -> Result<usize, StegoError> {
        let pattern = out_dir.join(FRAME_PATTERN);
        let max = max_frames.to_string();
        self.run(
            &self.ffmpeg,
            &[
                "-v",
                "error",
                "-i",
                path_arg(path)?,
                "-frames:v",
                max.as_str(),
                "-vsync",
                "0",
                "-pix_fmt",
                "rgb24",
                path_arg(&pattern)?,
            ],
        )?;
        Ok(StagingCache::frame_paths(out_dir)?.len())
    }

    fn encode(&self, frames_dir: &Path, fps: f64, codec: VideoCodec, out: &Path) -> Result<(), StegoError> {
        let pattern = frames_dir.join(FRAME_PATTERN);
        let rate = format!("{fps}");
        let mut args = vec!["-y", "-v", "error", "-framerate", rate.as_str(), "-i", path_arg(&pattern)?];
        args.extend_from_slice(codec.ffmpeg_args());
        args.push(path_arg(out)?);
        self.run(&self.ffmpeg, &args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
    }

    #[test]
    fn test_probe_json_shape() {
        let json = br#"{"streams":[{"width":320,"height":240,"r_frame_rate":"24/1","nb_read_packets":"48"}]}"#;
        let parsed: ProbeOutput = serde_json::from_slice(json).unwrap();
        let s = &parsed.streams[0];
        assert_eq!(s.width, Some(320));
        assert_eq!(s.nb_read_packets.as_deref(), Some("48"));
        assert!(s.nb_frames.is_none());
    }

    #[test]
    fn test_missing_binary_is_video_error() {
        let backend = FfmpegBackend::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = backend.probe(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, StegoError::Video(_)));
    }
}
