//! Transform-domain embedding for PCM audio.
//!
//! Each channel's middle segment is decomposed with a multi-level Haar DWT.
//! One bit is carried by the sign of one detail coefficient: bit 1 forces
//! `+max(|c|, floor)`, bit 0 forces `-max(|c|, floor)`. Samples outside the
//! segment are never written.
//!
//! Bits are laid out channel by channel, then band by band in the configured
//! order, then by coefficient site.

use tracing::debug;

use crate::capacity::{band_len, ensure_fits, suggest_audio_seconds, transform_capacity_bits, transform_segment};
use crate::config::TransformConfig;
use crate::error::StegoError;
use crate::frame::{peek_layout, peek_metadata_len, Magic, FIXED_HEADER_LEN, MAGIC_LEN};
use crate::plan::TransformParams;

use super::audio::AudioCarrier;
use super::wavelet::{self, Decomposition};

/// Sign coder over wavelet detail coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCoder {
    pub params: TransformParams,
    pub magnitude_floor: f64,
    pub epsilon: f64,
}

impl From<&TransformConfig> for TransformCoder {
    fn from(c: &TransformConfig) -> Self {
        Self {
            params: TransformParams::from(c),
            magnitude_floor: c.magnitude_floor,
            epsilon: c.epsilon,
        }
    }
}

impl TransformCoder {
    pub fn capacity_bits(&self, carrier: &AudioCarrier) -> usize {
        transform_capacity_bits(carrier.frame_count(), carrier.channels(), &self.params)
    }

    /// Bands that receive at least one bit for a `bits`-long frame.
    pub fn bands_used(&self, carrier: &AudioCarrier, bits: usize) -> Vec<usize> {
        let (_, segment) = transform_segment(carrier.frame_count(), &self.params);
        let mut remaining = bits;
        let mut used = Vec::new();
        for &band in &self.params.bands {
            if remaining == 0 {
                break;
            }
            let sites = self.sites(band_len(segment, band)).count() * carrier.channels();
            if sites > 0 {
                used.push(band);
                remaining = remaining.saturating_sub(sites);
            }
        }
        used
    }

    /// Coefficient indices used inside a band of `len` coefficients.
    fn sites(&self, len: usize) -> impl Iterator<Item = usize> {
        (self.params.edge_skip..len).step_by(self.params.spacing.max(1))
    }

    /// Returns a copy of `carrier` with `data` embedded.
    ///
    /// The result is decoded again before returning. If rounding or clipping
    /// destroyed any bit, the call fails with `CarrierUnsuitable`.
    pub fn embed(&self, carrier: &AudioCarrier, data: &[u8]) -> Result<AudioCarrier, StegoError> {
        let required = data.len() * 8;
        let capacity = self.capacity_bits(carrier);
        ensure_fits(required, capacity, || {
            format!(
                "use audio of at least {:.1} seconds",
                suggest_audio_seconds(required, carrier.sample_rate(), carrier.channels(), &self.params)
            )
        })?;

        let (start, segment) = transform_segment(carrier.frame_count(), &self.params);
        let mut out = carrier.clone();
        let mut k = 0usize;

        for ch in 0..carrier.channels() {
            if k >= required {
                break;
            }
            let mut samples = carrier.channel(ch);
            let mut decomposition = decompose(&samples[start..start + segment], self.params.levels);

            for &band in &self.params.bands {
                let coefficients = decomposition.band_mut(band);
                for site in self.sites(coefficients.len()) {
                    if k >= required {
                        break;
                    }
                    let bit = (data[k / 8] >> (k % 8)) & 1;
                    let magnitude = coefficients[site].abs().max(self.magnitude_floor);
                    coefficients[site] = if bit == 1 { magnitude } else { -magnitude };
                    k += 1;
                }
            }

            let rebuilt = wavelet::inverse(&decomposition);
            for (slot, value) in samples[start..start + segment].iter_mut().zip(rebuilt) {
                *slot = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            }
            out.set_channel(ch, &samples);
        }

        let readback = self.site_values(&out);
        let intact = (0..required).all(|k| {
            let bit = (data[k / 8] >> (k % 8)) & 1;
            self.read_bit(readback[k]) == bit
        });
        if !intact {
            return Err(StegoError::CarrierUnsuitable(
                "embedded coefficients did not survive sample rounding or clipping".into(),
            ));
        }

        debug!(bits = required, capacity, segment, "transform embed complete");
        Ok(out)
    }

    /// Reads an embedded frame back.
    pub fn extract(&self, carrier: &AudioCarrier) -> Result<Vec<u8>, StegoError> {
        let values = self.site_values(carrier);
        let head = self.read_bytes(&values, MAGIC_LEN + 4).ok_or(StegoError::NotFound)?;
        if Magic::parse(&head) != Some(Magic::Embedded) {
            return Err(StegoError::NotFound);
        }

        let (_, metadata_len) = peek_metadata_len(&head)?;
        let header = self
            .read_bytes(&values, FIXED_HEADER_LEN + metadata_len)
            .ok_or_else(|| StegoError::CorruptContainer("metadata overruns carrier".into()))?;
        let total = peek_layout(&header)?.total_len();

        self.read_bytes(&values, total).ok_or_else(|| {
            StegoError::CorruptContainer(format!(
                "declared frame of {total} bytes exceeds capacity of {} bytes",
                values.len() / 8
            ))
        })
    }

    #[inline]
    fn read_bit(&self, c: f64) -> u8 {
        (c > self.epsilon) as u8
    }

    fn read_bytes(&self, values: &[f64], count: usize) -> Option<Vec<u8>> {
        if count * 8 > values.len() {
            return None;
        }
        let mut out = vec![0u8; count];
        for (k, &c) in values[..count * 8].iter().enumerate() {
            out[k / 8] |= self.read_bit(c) << (k % 8);
        }
        Some(out)
    }

    /// Coefficient values at every site, in bit order.
    fn site_values(&self, carrier: &AudioCarrier) -> Vec<f64> {
        let (start, segment) = transform_segment(carrier.frame_count(), &self.params);
        let mut values = Vec::new();
        for ch in 0..carrier.channels() {
            let samples = carrier.channel(ch);
            let decomposition = decompose(&samples[start..start + segment], self.params.levels);
            for &band in &self.params.bands {
                let coefficients = decomposition.band(band);
                values.extend(self.sites(coefficients.len()).map(|i| coefficients[i]));
            }
        }
        values
    }
}

fn decompose(samples: &[i16], levels: usize) -> Decomposition {
    let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    wavelet::forward(&signal, levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{frame, unframe, FrameOptions, Payload};
    use crate::stego::audio::sine_carrier;
    use hound::{SampleFormat, WavSpec};

    fn coder() -> TransformCoder {
        TransformCoder::from(&TransformConfig::default())
    }

    fn framed(text: &str, password: Option<&str>) -> Vec<u8> {
        frame(&Payload::text(text), password, &FrameOptions::embedded(Some("wav".into()))).unwrap()
    }

    #[test]
    fn test_roundtrip_through_wav_bytes() {
        let carrier = sine_carrier(88_200, 1);
        let data = framed("transform domain", Some("pw"));

        let stego = coder().embed(&carrier, &data).unwrap();
        let reloaded = AudioCarrier::from_bytes(&stego.to_wav_bytes().unwrap()).unwrap();

        let extracted = coder().extract(&reloaded).unwrap();
        assert_eq!(extracted, data);
        assert_eq!(unframe(&extracted, Some("pw")).unwrap().payload, b"transform domain");
    }

    #[test]
    fn test_stereo_spills_into_second_channel() {
        let carrier = sine_carrier(20_000, 2);
        let coder = coder();
        let per_channel = coder.capacity_bits(&carrier) / 2;
        let data = vec![0xA5u8; per_channel / 8 + 16];

        let stego = coder.embed(&carrier, &data).unwrap();
        assert_ne!(stego.channel(1), carrier.channel(1));

        let values = coder.site_values(&stego);
        assert_eq!(coder.read_bytes(&values, data.len()).unwrap(), data);
    }

    #[test]
    fn test_edges_are_untouched() {
        let carrier = sine_carrier(44_100, 1);
        let stego = coder().embed(&carrier, &framed("edges", None)).unwrap();

        let (start, segment) = transform_segment(44_100, &coder().params);
        assert_eq!(&stego.samples()[..start], &carrier.samples()[..start]);
        assert_eq!(
            &stego.samples()[start + segment..],
            &carrier.samples()[start + segment..]
        );
    }

    #[test]
    fn test_insufficient_capacity_suggests_duration() {
        let carrier = sine_carrier(4_000, 1);
        let err = coder().embed(&carrier, &vec![0u8; 2_000]).unwrap_err();
        match err {
            StegoError::InsufficientCapacity { suggestion, .. } => {
                assert!(suggestion.unwrap().contains("seconds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_clipping_carrier_is_unsuitable() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let carrier = AudioCarrier::new(spec, vec![i16::MAX; 60_000]);
        let config = TransformConfig {
            bands: vec![3],
            magnitude_floor: 100.0,
            epsilon: 60.0,
            ..TransformConfig::default()
        };
        let result = TransformCoder::from(&config).embed(&carrier, &framed("clip", None));
        assert!(matches!(result, Err(StegoError::CarrierUnsuitable(_))));
    }

    #[test]
    fn test_clean_audio_is_not_found() {
        let carrier = sine_carrier(44_100, 1);
        assert!(coder().extract(&carrier).unwrap_err().is_not_found());
    }

    #[test]
    fn test_bands_used_follows_declared_order() {
        let carrier = sine_carrier(44_100, 1);
        let coder = coder();
        assert_eq!(coder.bands_used(&carrier, 10), vec![3]);
        let all = coder.capacity_bits(&carrier);
        assert_eq!(coder.bands_used(&carrier, all), vec![3, 2]);
    }
}
