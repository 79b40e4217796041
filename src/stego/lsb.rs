//! Pixel-domain LSB engine with redundancy and blind parameter recovery.
//!
//! Each framed bit is written `redundancy` times into consecutive sites
//! (`spacing` samples apart). Extraction majority-votes each group back into
//! one bit; ties resolve to 0.
//!
//! Bits are taken LSB-first from each byte.

use tracing::debug;

use crate::capacity::{ensure_fits, pixel_capacity_bits};
use crate::error::StegoError;
use crate::frame::{peek_layout, peek_metadata_len, Magic, FIXED_HEADER_LEN, MAGIC_LEN};
use crate::plan::LsbParams;

use super::samples::SampleMatrix;

/// Redundancy factors tried during blind recovery, highest first.
///
/// A frame written at `(R, s)` also reads back under `(R / m, s * m)`, since
/// that layout lands on a subset of each group. Trying the highest factor
/// first keeps the full majority vote. Redundancy 1 is never guessed.
pub const BLIND_REDUNDANCY: [usize; 4] = [5, 4, 3, 2];

/// Spacings tried during blind recovery.
pub const BLIND_SPACING: [usize; 4] = [1, 2, 3, 4];

/// Hard cap on parameter combinations inspected by [`locate`].
pub const MAX_BLIND_CANDIDATES: usize = 24;

/// Majority vote over one redundancy group.
#[inline]
pub fn majority(ones: usize, redundancy: usize) -> u8 {
    (ones * 2 > redundancy) as u8
}

/// Capacity of `matrix` under `params`, in framed bits.
pub fn capacity_bits<M: SampleMatrix + ?Sized>(matrix: &M, params: &LsbParams) -> usize {
    pixel_capacity_bits(matrix.sample_count(), params)
}

/// Writes `data` into `matrix`.
///
/// Capacity is checked before the first write, so a rejected call leaves the
/// matrix untouched.
pub fn embed<M: SampleMatrix + ?Sized>(
    matrix: &mut M,
    params: &LsbParams,
    data: &[u8],
) -> Result<(), StegoError> {
    let required = data.len() * 8;
    let capacity = capacity_bits(matrix, params);
    ensure_fits(required, capacity, || {
        format!(
            "carrier needs at least {} samples at redundancy {} and spacing {}",
            params.samples_needed(data.len()),
            params.redundancy,
            params.spacing
        )
    })?;

    for k in 0..required {
        let bit = (data[k / 8] >> (k % 8)) & 1;
        for copy in 0..params.redundancy {
            matrix.set_lsb(params.site(k, copy), bit);
        }
    }

    debug!(
        bits = required,
        capacity,
        redundancy = params.redundancy,
        spacing = params.spacing,
        "lsb embed complete"
    );
    Ok(())
}

/// Reads `count` bytes starting at framed byte `start`.
///
/// Returns `None` if the carrier is too short.
pub fn read_bytes<M: SampleMatrix + ?Sized>(
    matrix: &M,
    params: &LsbParams,
    start: usize,
    count: usize,
) -> Option<Vec<u8>> {
    if params.samples_needed(start + count) > matrix.sample_count() {
        return None;
    }
    let mut out = vec![0u8; count];
    for (i, byte) in out.iter_mut().enumerate() {
        for b in 0..8 {
            let k = (start + i) * 8 + b;
            let ones = (0..params.redundancy)
                .filter(|&copy| matrix.lsb(params.site(k, copy)) == 1)
                .count();
            *byte |= majority(ones, params.redundancy) << b;
        }
    }
    Some(out)
}

/// Blind search order: the preferred parameters, then the fixed grid.
pub fn candidate_params(preferred: &LsbParams) -> Vec<LsbParams> {
    let mut out = vec![*preferred];
    for &redundancy in &BLIND_REDUNDANCY {
        for &spacing in &BLIND_SPACING {
            let p = LsbParams {
                redundancy,
                spacing,
                offset: preferred.offset,
            };
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    out.truncate(MAX_BLIND_CANDIDATES);
    out
}

/// Outcome of a successful header search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// The full frame was read.
    Found { params: LsbParams, frame: Vec<u8> },
    /// The header matched but the frame runs past the loaded samples.
    NeedMore {
        params: LsbParams,
        samples_required: usize,
    },
}

/// Searches the candidate parameters for an embedded frame header.
///
/// Returns `NotFound` when no candidate yields the magic, and
/// `CorruptContainer` when a magic matched but its header was inconsistent.
pub fn locate<M: SampleMatrix + ?Sized>(
    matrix: &M,
    preferred: &LsbParams,
) -> Result<Located, StegoError> {
    let mut corrupt: Option<String> = None;

    for params in candidate_params(preferred) {
        let Some(head) = read_bytes(matrix, &params, 0, MAGIC_LEN + 4) else {
            continue;
        };
        if Magic::parse(&head) != Some(Magic::Embedded) {
            continue;
        }

        let metadata_len = match peek_metadata_len(&head) {
            Ok((_, len)) => len,
            Err(e) => {
                corrupt.get_or_insert(e.to_string());
                continue;
            }
        };

        debug!(
            redundancy = params.redundancy,
            spacing = params.spacing,
            metadata_len,
            "embedded magic matched"
        );

        let header_len = FIXED_HEADER_LEN + metadata_len;
        let needed = params.samples_needed(header_len);
        if needed > matrix.sample_count() {
            return Ok(Located::NeedMore {
                params,
                samples_required: needed,
            });
        }
        let Some(header) = read_bytes(matrix, &params, 0, header_len) else {
            continue;
        };
        let layout = match peek_layout(&header) {
            Ok(layout) => layout,
            Err(e) => {
                corrupt.get_or_insert(e.to_string());
                continue;
            }
        };

        let total = layout.total_len();
        let needed = params.samples_needed(total);
        if needed > matrix.sample_count() {
            return Ok(Located::NeedMore {
                params,
                samples_required: needed,
            });
        }
        if let Some(frame) = read_bytes(matrix, &params, 0, total) {
            return Ok(Located::Found { params, frame });
        }
    }

    match corrupt {
        Some(msg) => Err(StegoError::CorruptContainer(msg)),
        None => Err(StegoError::NotFound),
    }
}

/// Locates and reads a frame that must lie entirely within `matrix`.
pub fn extract<M: SampleMatrix + ?Sized>(
    matrix: &M,
    preferred: &LsbParams,
) -> Result<(LsbParams, Vec<u8>), StegoError> {
    match locate(matrix, preferred)? {
        Located::Found { params, frame } => Ok((params, frame)),
        Located::NeedMore {
            samples_required, ..
        } => Err(StegoError::CorruptContainer(format!(
            "declared frame needs {} samples but carrier has {}",
            samples_required,
            matrix.sample_count()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{frame, unframe, FrameOptions, Payload};

    fn noisy_samples(n: usize) -> Vec<i16> {
        (0..n).map(|i| ((i * 7919) % 65_536) as i16).collect()
    }

    fn embedded_frame(text: &str) -> Vec<u8> {
        frame(&Payload::text(text), None, &FrameOptions::embedded(None)).unwrap()
    }

    #[test]
    fn test_majority_tie_breaks_to_zero() {
        assert_eq!(majority(1, 2), 0);
        assert_eq!(majority(2, 4), 0);
        assert_eq!(majority(2, 3), 1);
        assert_eq!(majority(3, 4), 1);
        assert_eq!(majority(1, 1), 1);
    }

    #[test]
    fn test_embed_and_read_back() {
        let mut samples = noisy_samples(4_000);
        let params = LsbParams::new(3, 1);
        embed(&mut samples, &params, b"abc").unwrap();
        assert_eq!(read_bytes(&samples, &params, 0, 3).unwrap(), b"abc");
        assert_eq!(read_bytes(&samples, &params, 1, 2).unwrap(), b"bc");
    }

    #[test]
    fn test_capacity_rejection_leaves_carrier_untouched() {
        let original = noisy_samples(100);
        let mut samples = original.clone();
        let params = LsbParams::new(3, 1);
        // 100 samples / 3 = 33 bits < 40
        let result = embed(&mut samples, &params, b"12345");
        assert!(matches!(result, Err(StegoError::InsufficientCapacity { .. })));
        assert_eq!(samples, original);
    }

    #[test]
    fn test_single_flip_per_group_is_corrected() {
        let mut samples = noisy_samples(2_000);
        let params = LsbParams::new(3, 1);
        let data = b"robust!";
        embed(&mut samples, &params, data).unwrap();

        // Flip a different copy in every group.
        for k in 0..data.len() * 8 {
            let site = params.site(k, k % 3);
            let bit = samples.lsb(site);
            samples.set_lsb(site, bit ^ 1);
        }
        assert_eq!(read_bytes(&samples, &params, 0, data.len()).unwrap(), data);
    }

    #[test]
    fn test_blind_recovery_finds_non_default_params() {
        let framed = embedded_frame("blind");
        let mut samples = noisy_samples(20_000);
        let params = LsbParams::new(4, 3);
        embed(&mut samples, &params, &framed).unwrap();

        let (found, bytes) = extract(&samples, &LsbParams::new(3, 1)).unwrap();
        assert_eq!(bytes, framed);
        assert_eq!(unframe(&bytes, None).unwrap().payload, b"blind");
        assert_eq!(found, params);
    }

    #[test]
    fn test_blind_recovery_keeps_majority_vote() {
        let framed = embedded_frame("one flipped copy");
        let params = LsbParams::new(3, 1);
        let mut samples = noisy_samples(params.samples_needed(framed.len()) + 64);
        embed(&mut samples, &params, &framed).unwrap();

        // Copy 0 of the last bit is also what a (1, 3) reading would see.
        let site = params.site(framed.len() * 8 - 1, 0);
        let bit = samples.lsb(site);
        samples.set_lsb(site, bit ^ 1);

        let (found, bytes) = extract(&samples, &LsbParams::new(2, 1)).unwrap();
        assert_eq!(found, params);
        assert_eq!(bytes, framed);
    }

    #[test]
    fn test_clean_carrier_is_not_found() {
        let samples: Vec<i16> = vec![0; 10_000];
        assert!(matches!(
            extract(&samples, &LsbParams::new(3, 1)),
            Err(StegoError::NotFound)
        ));
    }

    #[test]
    fn test_truncated_frame_needs_more() {
        let framed = embedded_frame("this frame will be cut short");
        let params = LsbParams::new(2, 1);
        let mut samples = noisy_samples(params.samples_needed(framed.len()));
        embed(&mut samples, &params, &framed).unwrap();

        samples.truncate(samples.len() - 100);
        match locate(&samples, &params).unwrap() {
            Located::NeedMore {
                params: p,
                samples_required,
            } => {
                assert_eq!(p, params);
                assert_eq!(samples_required, params.samples_needed(framed.len()));
            }
            other => panic!("expected NeedMore, got {other:?}"),
        }
        assert!(matches!(
            extract(&samples, &params),
            Err(StegoError::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_candidate_list_is_bounded_and_starts_with_preferred() {
        let preferred = LsbParams::new(3, 1);
        let candidates = candidate_params(&preferred);
        assert_eq!(candidates[0], preferred);
        assert!(candidates.len() <= MAX_BLIND_CANDIDATES);
        assert_eq!(candidates.len(), 16);
        assert!(candidates[1..].iter().all(|p| p.redundancy >= 2));
        assert!(candidates[1..]
            .windows(2)
            .all(|w| w[0].redundancy >= w[1].redundancy));
    }
}
