//! WAV audio carriers.
//!
//! Holds interleaved 16-bit PCM samples. The same buffer serves both the
//! transform-domain engine and sample LSB embedding.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use crate::error::StegoError;

/// A 16-bit PCM WAV file held in memory.
#[derive(Debug, Clone)]
pub struct AudioCarrier {
    spec: WavSpec,
    samples: Vec<i16>,
}

impl AudioCarrier {
    pub fn new(spec: WavSpec, samples: Vec<i16>) -> Self {
        Self { spec, samples }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StegoError> {
        Self::from_reader(WavReader::open(path)?)
    }

    /// Trailing bytes after the `data` chunk are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StegoError> {
        Self::from_reader(WavReader::new(Cursor::new(bytes))?)
    }

    fn from_reader<R: Read>(reader: WavReader<R>) -> Result<Self, StegoError> {
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(StegoError::UnsupportedCarrier(format!(
                "only 16-bit PCM WAV is supported, got {} bits {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { spec, samples })
    }

    pub fn spec(&self) -> &WavSpec {
        &self.spec
    }

    pub fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels().max(1)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.spec.sample_rate.max(1) as f64
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut Vec<i16> {
        &mut self.samples
    }

    /// A carrier with the same format and new samples.
    pub fn with_samples(&self, samples: Vec<i16>) -> Self {
        Self {
            spec: self.spec,
            samples,
        }
    }

    /// Samples of channel `ch`, de-interleaved.
    pub fn channel(&self, ch: usize) -> Vec<i16> {
        self.samples
            .iter()
            .skip(ch)
            .step_by(self.channels().max(1))
            .copied()
            .collect()
    }

    /// Overwrites channel `ch` from the start with `values`.
    pub fn set_channel(&mut self, ch: usize, values: &[i16]) {
        let channels = self.channels().max(1);
        for (slot, &v) in self.samples.iter_mut().skip(ch).step_by(channels).zip(values) {
            *slot = v;
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StegoError> {
        let writer = WavWriter::create(path, self.spec)?;
        self.write_samples(writer)
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, StegoError> {
        let mut bytes = Vec::new();
        {
            let writer = WavWriter::new(Cursor::new(&mut bytes), self.spec)?;
            self.write_samples(writer)?;
        }
        Ok(bytes)
    }

    fn write_samples<W: Write + Seek>(&self, mut writer: WavWriter<W>) -> Result<(), StegoError> {
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// A mono or multi-channel 440 Hz sine carrier.
#[cfg(test)]
pub(crate) fn sine_carrier(frames: usize, channels: u16) -> AudioCarrier {
    let spec = WavSpec {
        channels,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let samples = (0..frames)
        .flat_map(|i| {
            let t = i as f64 / 44_100.0;
            let v = (f64::sin(2.0 * std::f64::consts::PI * 440.0 * t) * 16_000.0) as i16;
            std::iter::repeat(v).take(channels as usize)
        })
        .collect();
    AudioCarrier { spec, samples }
}
