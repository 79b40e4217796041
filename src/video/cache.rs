//! Staging cache for decoded video frames.
//!
//! Lossy or re-encoding video codecs destroy LSB data, so the exact frames a
//! payload was embedded into are kept on disk, keyed by the fingerprint of
//! the delivered file:
//!
//! ```text
//! <root>/
//!   .pending-<uuid>/          frames being prepared, never looked up
//!   <base>_<fingerprint>/
//!     frame_000001.png
//!     ...
//!     staging.json            sidecar
//! ```
//!
//! A pending directory becomes visible only through one `rename`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StagingConfig;
use crate::error::StegoError;
use crate::stego::FrameStack;

use super::fingerprint::CarrierFingerprint;
use super::VideoInfo;

pub const SIDECAR_NAME: &str = "staging.json";

const PENDING_PREFIX: &str = ".pending-";

/// Fallback entries inspected per extraction.
pub const MAX_FALLBACK_CANDIDATES: usize = 8;

/// Pending directories older than this are abandoned and pruned.
const STALE_PENDING_HOURS: i64 = 24;

const DIM_TOLERANCE: i64 = 2;
const FRAME_TOLERANCE: i64 = 3;
const FRAME_TOLERANCE_RATIO: f64 = 0.02;
const FPS_TOLERANCE: f64 = 0.5;

/// Metadata stored next to staged frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingSidecar {
    pub width: u32,
    pub height: u32,
    pub total_frames: usize,
    pub fps: f64,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

/// A committed cache directory.
#[derive(Debug, Clone)]
pub struct StagedEntry {
    pub dir: PathBuf,
    pub sidecar: StagingSidecar,
}

/// Frames being prepared. Removed on drop unless committed.
#[derive(Debug)]
pub struct PendingStage {
    dir: PathBuf,
    base: String,
    committed: bool,
}

impl PendingStage {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for PendingStage {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                warn!(dir = %self.dir.display(), error = %e, "failed to discard pending stage");
            }
        }
    }
}

/// Entries removed by [`StagingCache::prune`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_entries: usize,
    pub removed_pending: usize,
}

/// How closely a staged entry matches a probed video; `None` when any
/// property is out of tolerance. Higher is closer, 1.0 is exact.
pub fn match_score(target: &VideoInfo, sidecar: &StagingSidecar) -> Option<f64> {
    let dw = (target.width as i64 - sidecar.width as i64).abs();
    let dh = (target.height as i64 - sidecar.height as i64).abs();
    if dw > DIM_TOLERANCE || dh > DIM_TOLERANCE {
        return None;
    }

    let df = (target.frame_count as i64 - sidecar.total_frames as i64).abs();
    let ratio_limit = (target.frame_count as f64 * FRAME_TOLERANCE_RATIO).floor() as i64;
    if df > FRAME_TOLERANCE.max(ratio_limit) {
        return None;
    }

    let dfps = (target.fps - sidecar.fps).abs();
    if dfps > FPS_TOLERANCE {
        return None;
    }

    let dim_penalty = (dw + dh) as f64 / (2 * DIM_TOLERANCE + 1) as f64;
    let frame_penalty = df as f64 / (FRAME_TOLERANCE.max(ratio_limit) + 1) as f64;
    let fps_penalty = dfps / (FPS_TOLERANCE * 2.0);
    Some(1.0 - (dim_penalty + frame_penalty + fps_penalty) / 3.0)
}

/// Frame file name as written by the decoder: 1-based, six digits.
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:06}.png", index + 1)
}

#[derive(Debug, Clone)]
pub struct StagingCache {
    root: PathBuf,
}

impl StagingCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StagingConfig) -> Result<Self, StegoError> {
        Ok(Self::new(config.resolve_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a uniquely named pending directory.
    pub fn begin(&self, base: &str) -> Result<PendingStage, StegoError> {
        let dir = self.root.join(format!("{PENDING_PREFIX}{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "pending stage created");
        Ok(PendingStage {
            dir,
            base: sanitize_base(base),
            committed: false,
        })
    }

    /// Writes the sidecar and publishes the pending directory as
    /// `<base>_<fingerprint>`, replacing any previous entry of that name.
    pub fn commit(&self, mut pending: PendingStage, sidecar: &StagingSidecar) -> Result<PathBuf, StegoError> {
        let json = serde_json::to_vec_pretty(sidecar)?;
        fs::write(pending.dir.join(SIDECAR_NAME), json)?;

        let target = self.root.join(format!("{}_{}", pending.base, sidecar.fingerprint));
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&pending.dir, &target)?;
        pending.committed = true;

        info!(
            dir = %target.display(),
            fingerprint = %sidecar.fingerprint,
            frames = sidecar.total_frames,
            "staged frames committed"
        );
        Ok(target)
    }

    /// All committed entries with a readable sidecar.
    pub fn entries(&self) -> Result<Vec<StagedEntry>, StegoError> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() || is_pending(&dir) {
                continue;
            }
            match read_sidecar(&dir) {
                Ok(sidecar) => out.push(StagedEntry { dir, sidecar }),
                Err(e) => debug!(dir = %dir.display(), error = %e, "skipping entry without sidecar"),
            }
        }
        Ok(out)
    }

    /// The entry committed under exactly this fingerprint.
    pub fn lookup(&self, fingerprint: &CarrierFingerprint) -> Result<Option<StagedEntry>, StegoError> {
        let suffix = format!("_{}", fingerprint.as_str());
        Ok(self.entries()?.into_iter().find(|e| {
            e.sidecar.fingerprint == fingerprint.as_str()
                && e.dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&suffix))
        }))
    }

    /// Entries whose geometry matches `info`, most recent first, then by score.
    pub fn fallback_candidates(&self, info: &VideoInfo) -> Result<Vec<StagedEntry>, StegoError> {
        let mut scored: Vec<(f64, StagedEntry)> = self
            .entries()?
            .into_iter()
            .filter_map(|e| match_score(info, &e.sidecar).map(|s| (s, e)))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            b.sidecar
                .created_at
                .cmp(&a.sidecar.created_at)
                .then(sb.total_cmp(sa))
        });
        scored.truncate(MAX_FALLBACK_CANDIDATES);
        Ok(scored.into_iter().map(|(_, e)| e).collect())
    }

    /// Removes entries older than `retention_days` and abandoned pending
    /// directories.
    pub fn prune(&self, retention_days: u32) -> Result<PruneReport, StegoError> {
        self.prune_at(Utc::now(), retention_days)
    }

    fn prune_at(&self, now: DateTime<Utc>, retention_days: u32) -> Result<PruneReport, StegoError> {
        let mut report = PruneReport::default();
        let cutoff = now - Duration::days(retention_days as i64);

        for entry in self.entries()? {
            if entry.sidecar.created_at < cutoff {
                fs::remove_dir_all(&entry.dir)?;
                report.removed_entries += 1;
            }
        }

        if let Ok(read_dir) = fs::read_dir(&self.root) {
            let stale = now - Duration::hours(STALE_PENDING_HOURS);
            for entry in read_dir.flatten() {
                let dir = entry.path();
                if !is_pending(&dir) {
                    continue;
                }
                let modified: Option<DateTime<Utc>> =
                    entry.metadata().and_then(|m| m.modified()).ok().map(Into::into);
                if modified.is_some_and(|m| m < stale) {
                    fs::remove_dir_all(&dir)?;
                    report.removed_pending += 1;
                }
            }
        }

        info!(
            removed = report.removed_entries,
            pending = report.removed_pending,
            "staging cache pruned"
        );
        Ok(report)
    }

    /// Frame files in `dir`, in frame order.
    pub fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>, StegoError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".png"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Loads the first `count` frames of `dir` (all when `None`).
    pub fn load_frames(dir: &Path, count: Option<usize>) -> Result<FrameStack, StegoError> {
        let paths = Self::frame_paths(dir)?;
        let take = count.unwrap_or(paths.len()).min(paths.len());
        let frames = paths[..take]
            .iter()
            .map(|p| -> Result<_, StegoError> { Ok(image::open(p)?.to_rgb8()) })
            .collect::<Result<Vec<_>, _>>()?;
        FrameStack::new(frames)
            .ok_or_else(|| StegoError::Video(format!("frames in {} differ in size", dir.display())))
    }
}

fn is_pending(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PENDING_PREFIX))
}

fn read_sidecar(dir: &Path) -> Result<StagingSidecar, StegoError> {
    let bytes = fs::read(dir.join(SIDECAR_NAME))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Keeps directory names portable.
fn sanitize_base(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn info(width: u32, height: u32, frame_count: usize, fps: f64) -> VideoInfo {
        VideoInfo {
            width,
            height,
            frame_count,
            fps,
        }
    }

    fn sidecar(fp: &str, frames: usize, created_at: DateTime<Utc>) -> StagingSidecar {
        StagingSidecar {
            width: 64,
            height: 48,
            total_frames: frames,
            fps: 30.0,
            fingerprint: fp.to_string(),
            created_at,
            codec: Some("ffv1".into()),
        }
    }

    fn commit_entry(cache: &StagingCache, base: &str, side: &StagingSidecar) -> PathBuf {
        let pending = cache.begin(base).unwrap();
        let frame = ImageBuffer::from_pixel(4, 4, Rgb([1u8, 2, 3]));
        frame.save(pending.dir().join(frame_file_name(0))).unwrap();
        cache.commit(pending, side).unwrap()
    }

    #[test]
    fn test_match_score_tolerances() {
        let side = sidecar("abcd1234", 300, Utc::now());
        assert_eq!(match_score(&info(64, 48, 300, 30.0), &side), Some(1.0));
        assert!(match_score(&info(66, 46, 303, 30.5), &side).is_some());
        assert!(match_score(&info(67, 48, 300, 30.0), &side).is_none());
        // 2% of 300 frames is 6, wider than the fixed 3
        assert!(match_score(&info(64, 48, 306, 30.0), &side).is_some());
        assert!(match_score(&info(64, 48, 307, 30.0), &side).is_none());
        assert!(match_score(&info(64, 48, 300, 30.6), &side).is_none());

        let close = match_score(&info(64, 48, 301, 30.0), &side).unwrap();
        let far = match_score(&info(64, 48, 303, 30.0), &side).unwrap();
        assert!(close > far);
    }

    #[test]
    fn test_frame_tolerance_scales_with_length() {
        let side = sidecar("abcd1234", 1000, Utc::now());
        // 2% of 1000 frames is 20
        assert!(match_score(&info(64, 48, 1020, 30.0), &side).is_some());
        assert!(match_score(&info(64, 48, 1021, 30.0), &side).is_none());
    }

    #[test]
    fn test_commit_and_lookup() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path());
        let dir = commit_entry(&cache, "my clip.mp4", &sidecar("deadbeef", 1, Utc::now()));

        assert_eq!(dir.file_name().unwrap(), "my_clip_mp4_deadbeef");
        let found = cache
            .lookup(&CarrierFingerprint("deadbeef".into()))
            .unwrap()
            .unwrap();
        assert_eq!(found.dir, dir);
        assert!(cache.lookup(&CarrierFingerprint("00000000".into())).unwrap().is_none());

        let frames = StagingCache::load_frames(&found.dir, None).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_dropped_pending_is_removed() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path());
        let pending = cache.begin("clip").unwrap();
        let dir = pending.dir().to_path_buf();
        assert!(dir.exists());
        drop(pending);
        assert!(!dir.exists());
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_orders_most_recent_first() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path());
        let now = Utc::now();
        commit_entry(&cache, "old", &sidecar("11111111", 300, now - Duration::hours(2)));
        commit_entry(&cache, "new", &sidecar("22222222", 301, now));
        commit_entry(&cache, "other", &StagingSidecar {
            width: 1920,
            ..sidecar("33333333", 300, now)
        });

        let candidates = cache.fallback_candidates(&info(64, 48, 300, 30.0)).unwrap();
        let fps: Vec<_> = candidates.iter().map(|c| c.sidecar.fingerprint.as_str()).collect();
        assert_eq!(fps, vec!["22222222", "11111111"]);
    }

    #[test]
    fn test_prune_removes_expired_entries() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path());
        let now = Utc::now();
        commit_entry(&cache, "stale", &sidecar("11111111", 10, now - Duration::days(10)));
        commit_entry(&cache, "fresh", &sidecar("22222222", 10, now));

        let report = cache.prune_at(now, 7).unwrap();
        assert_eq!(report.removed_entries, 1);
        let left: Vec<_> = cache
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.sidecar.fingerprint)
            .collect();
        assert_eq!(left, vec!["22222222".to_string()]);
    }

    #[test]
    fn test_prune_removes_abandoned_pending() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path());
        let pending = cache.begin("crashed").unwrap();
        let dir = pending.dir().to_path_buf();
        std::mem::forget(pending);

        let report = cache.prune_at(Utc::now() + Duration::hours(48), 7).unwrap();
        assert_eq!(report.removed_pending, 1);
        assert!(!dir.exists());
    }

    #[test]
    fn test_missing_root_has_no_entries() {
        let temp = TempDir::new().unwrap();
        let cache = StagingCache::new(temp.path().join("absent"));
        assert!(cache.entries().unwrap().is_empty());
    }
}
