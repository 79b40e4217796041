//! Capacity planning.
//!
//! Every check here runs before a carrier is touched. An undersized carrier
//! is rejected with [`StegoError::InsufficientCapacity`] together with a
//! suggested minimum carrier obtained by inverting the capacity formula.

use crate::error::StegoError;
use crate::frame::FIXED_HEADER_LEN;
use crate::plan::{LsbParams, TransformParams};

/// Header reserve used for user-facing byte estimates: fixed header plus a
/// typical metadata record.
pub const FRAME_HEADER_RESERVE_BYTES: usize = FIXED_HEADER_LEN + 240;

/// Pixel-domain capacity in framed bits.
///
/// `sample_count` is channel count times pixel (or sample) count.
pub fn pixel_capacity_bits(sample_count: usize, params: &LsbParams) -> usize {
    if params.redundancy == 0 || params.spacing == 0 {
        return 0;
    }
    let usable = sample_count.saturating_sub(params.offset);
    let sites = usable.div_ceil(params.spacing);
    sites / params.redundancy
}

/// Number of coefficient sites in a band of `band_len` coefficients.
pub fn band_site_count(band_len: usize, edge_skip: usize, spacing: usize) -> usize {
    if spacing == 0 || band_len <= edge_skip {
        return 0;
    }
    (band_len - edge_skip).div_ceil(spacing)
}

/// Start and length of the carved-out segment of a `frame_count`-long channel.
///
/// The length is truncated to a multiple of `2^levels` so the decomposition
/// is exact.
pub fn transform_segment(frame_count: usize, params: &TransformParams) -> (usize, usize) {
    let skip = (frame_count as f64 * params.edge_fraction).floor() as usize;
    let inner = frame_count.saturating_sub(2 * skip);
    let block = 1usize << params.levels;
    (skip, (inner / block) * block)
}

/// Band lengths (indexed by band number) of a segment of `segment_len` samples.
pub fn band_len(segment_len: usize, band: usize) -> usize {
    segment_len >> band
}

/// Transform-domain capacity in framed bits.
pub fn transform_capacity_bits(frame_count: usize, channels: usize, params: &TransformParams) -> usize {
    let (_, segment) = transform_segment(frame_count, params);
    let per_channel: usize = params
        .bands
        .iter()
        .map(|&b| band_site_count(band_len(segment, b), params.edge_skip, params.spacing))
        .sum();
    per_channel * channels
}

pub fn fits(required_bits: usize, capacity_bits: usize) -> bool {
    required_bits <= capacity_bits
}

/// Approximate payload bytes that fit once the frame header is accounted for.
pub fn payload_capacity_bytes(capacity_bits: usize) -> usize {
    (capacity_bits / 8).saturating_sub(FRAME_HEADER_RESERVE_BYTES)
}

/// Fails with [`StegoError::InsufficientCapacity`] when the frame does not fit.
///
/// `suggest` is only evaluated on rejection.
pub fn ensure_fits<F>(required_bits: usize, capacity_bits: usize, suggest: F) -> Result<(), StegoError>
where
    F: FnOnce() -> String,
{
    if fits(required_bits, capacity_bits) {
        return Ok(());
    }
    Err(StegoError::InsufficientCapacity {
        required_bits,
        capacity_bits,
        suggestion: Some(suggest()),
    })
}

/// Smallest square image side (3 channels) that holds `required_bits`.
pub fn suggest_image_side(required_bits: usize, params: &LsbParams) -> u32 {
    let samples = params.samples_needed(required_bits.div_ceil(8));
    let pixels = samples.div_ceil(3) as f64;
    pixels.sqrt().ceil() as u32
}

/// Minimum video frame count for the given frame size.
pub fn suggest_video_frames(required_bits: usize, width: u32, height: u32, params: &LsbParams) -> usize {
    let per_frame = (width as usize) * (height as usize) * 3;
    if per_frame == 0 {
        return 0;
    }
    params
        .samples_needed(required_bits.div_ceil(8))
        .div_ceil(per_frame)
}

/// Minimum audio duration in seconds for transform-domain embedding.
pub fn suggest_audio_seconds(
    required_bits: usize,
    sample_rate: u32,
    channels: usize,
    params: &TransformParams,
) -> f64 {
    let frames = min_frames_for(|n| transform_capacity_bits(n, channels, params), required_bits);
    frames as f64 / sample_rate.max(1) as f64
}

/// Minimum audio duration in seconds for sample LSB embedding.
pub fn suggest_audio_seconds_lsb(
    required_bits: usize,
    sample_rate: u32,
    channels: usize,
    params: &LsbParams,
) -> f64 {
    let samples = params.samples_needed(required_bits.div_ceil(8));
    let frames = samples.div_ceil(channels.max(1));
    frames as f64 / sample_rate.max(1) as f64
}

/// Smallest `n` with `capacity(n) >= required`, by doubling then bisection.
fn min_frames_for<F>(capacity: F, required: usize) -> usize
where
    F: Fn(usize) -> usize,
{
    const LIMIT: usize = 1 << 40;
    let mut hi = 1usize;
    while capacity(hi) < required {
        if hi >= LIMIT {
            return LIMIT;
        }
        hi *= 2;
    }
    let mut lo = hi / 2;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if capacity(mid) >= required {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;

    #[test]
    fn test_pixel_capacity_formula() {
        // 64x64 RGB at redundancy 3
        let params = LsbParams::new(3, 1);
        assert_eq!(pixel_capacity_bits(64 * 64 * 3, &params), 4096);

        // Spacing halves the usable sites
        let params = LsbParams::new(3, 2);
        assert_eq!(pixel_capacity_bits(64 * 64 * 3, &params), 2048);
    }

    #[test]
    fn test_pixel_capacity_matches_samples_needed() {
        for r in 1..=5 {
            for s in 1..=4 {
                let params = LsbParams::new(r, s);
                for bytes in [1usize, 7, 33] {
                    let needed = params.samples_needed(bytes);
                    assert!(pixel_capacity_bits(needed, &params) >= bytes * 8);
                    assert!(pixel_capacity_bits(needed - 1, &params) < bytes * 8);
                }
            }
        }
    }

    #[test]
    fn test_fits_boundary() {
        assert!(fits(264, 264));
        assert!(!fits(265, 264));
    }

    #[test]
    fn test_ensure_fits_reports_suggestion() {
        let err = ensure_fits(100, 10, || "bigger".to_string()).unwrap_err();
        match err {
            StegoError::InsufficientCapacity {
                required_bits,
                capacity_bits,
                suggestion,
            } => {
                assert_eq!(required_bits, 100);
                assert_eq!(capacity_bits, 10);
                assert_eq!(suggestion.as_deref(), Some("bigger"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_suggested_image_is_large_enough() {
        let params = LsbParams::new(3, 1);
        let required = 10_000;
        let side = suggest_image_side(required, &params) as usize;
        assert!(pixel_capacity_bits(side * side * 3, &params) >= required);
        assert!(pixel_capacity_bits((side - 1) * (side - 1) * 3, &params) < required);
    }

    #[test]
    fn test_transform_segment_is_block_aligned() {
        let params = TransformParams::from(&TransformConfig::default());
        let (start, len) = transform_segment(44_100, &params);
        assert_eq!(start, 4_410);
        assert_eq!(len % 16, 0);
        assert!(start + len <= 44_100 - 4_410);
    }

    #[test]
    fn test_transform_capacity_scales_with_channels() {
        let params = TransformParams::from(&TransformConfig::default());
        let mono = transform_capacity_bits(44_100, 1, &params);
        let stereo = transform_capacity_bits(44_100, 2, &params);
        assert!(mono > 0);
        assert_eq!(stereo, mono * 2);
    }

    #[test]
    fn test_suggest_audio_seconds_inverts_capacity() {
        let params = TransformParams::from(&TransformConfig::default());
        let required = 20_000;
        let secs = suggest_audio_seconds(required, 44_100, 1, &params);
        let frames = (secs * 44_100.0).round() as usize;
        assert!(transform_capacity_bits(frames, 1, &params) >= required);
        assert!(transform_capacity_bits(frames - 2_000, 1, &params) < required);
    }

    #[test]
    fn test_suggest_video_frames() {
        let params = LsbParams::new(3, 1);
        let frames = suggest_video_frames(8 * 1_000, 16, 16, &params);
        let per_frame = 16 * 16 * 3;
        assert!(pixel_capacity_bits(frames * per_frame, &params) >= 8_000);
        assert!(pixel_capacity_bits((frames - 1) * per_frame, &params) < 8_000);
    }
}
