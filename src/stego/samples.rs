//! Sample-matrix views over carriers.
//!
//! The pixel-domain engine only needs to read and write the least significant
//! bit of the n-th sample. Traversal order is the native storage order:
//! channels within a pixel (alpha excluded), pixels row by row, frames in
//! sequence.

use image::{RgbImage, RgbaImage};

/// Linear LSB access to a carrier's samples.
pub trait SampleMatrix {
    fn sample_count(&self) -> usize;

    fn lsb(&self, index: usize) -> u8;

    fn set_lsb(&mut self, index: usize, bit: u8);
}

/// Color channels used per pixel.
pub const PIXEL_CHANNELS: usize = 3;

impl SampleMatrix for RgbImage {
    fn sample_count(&self) -> usize {
        self.as_raw().len()
    }

    fn lsb(&self, index: usize) -> u8 {
        self.as_raw()[index] & 1
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        let raw: &mut [u8] = self;
        raw[index] = (raw[index] & 0xFE) | (bit & 1);
    }
}

/// Alpha is never written: it is often flattened by viewers and editors.
impl SampleMatrix for RgbaImage {
    fn sample_count(&self) -> usize {
        (self.as_raw().len() / 4) * PIXEL_CHANNELS
    }

    fn lsb(&self, index: usize) -> u8 {
        self.as_raw()[rgba_index(index)] & 1
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        let i = rgba_index(index);
        let raw: &mut [u8] = self;
        raw[i] = (raw[i] & 0xFE) | (bit & 1);
    }
}

#[inline]
fn rgba_index(index: usize) -> usize {
    (index / PIXEL_CHANNELS) * 4 + index % PIXEL_CHANNELS
}

/// Interleaved 16-bit PCM samples.
impl SampleMatrix for [i16] {
    fn sample_count(&self) -> usize {
        self.len()
    }

    fn lsb(&self, index: usize) -> u8 {
        (self[index] & 1) as u8
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        self[index] = (self[index] & !1) | (bit & 1) as i16;
    }
}

impl SampleMatrix for Vec<i16> {
    fn sample_count(&self) -> usize {
        self.as_slice().sample_count()
    }

    fn lsb(&self, index: usize) -> u8 {
        self.as_slice().lsb(index)
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        self.as_mut_slice().set_lsb(index, bit)
    }
}

/// A run of equally sized RGB frames addressed as one sample sequence.
#[derive(Debug, Clone, Default)]
pub struct FrameStack {
    frames: Vec<RgbImage>,
    per_frame: usize,
}

impl FrameStack {
    /// Returns `None` if the frames differ in size.
    pub fn new(frames: Vec<RgbImage>) -> Option<Self> {
        let dims = frames.first().map(|f| f.dimensions());
        if frames.iter().any(|f| Some(f.dimensions()) != dims) {
            return None;
        }
        let per_frame = frames.first().map(|f| f.as_raw().len()).unwrap_or(0);
        Some(Self { frames, per_frame })
    }

    pub fn samples_per_frame(&self) -> usize {
        self.per_frame
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames that hold sample indices `0..samples`.
    pub fn frames_spanned(&self, samples: usize) -> usize {
        if self.per_frame == 0 {
            return 0;
        }
        samples.div_ceil(self.per_frame)
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }
}

impl SampleMatrix for FrameStack {
    fn sample_count(&self) -> usize {
        self.per_frame * self.frames.len()
    }

    fn lsb(&self, index: usize) -> u8 {
        self.frames[index / self.per_frame].lsb(index % self.per_frame)
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        let per_frame = self.per_frame;
        self.frames[index / per_frame].set_lsb(index % per_frame, bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    #[test]
    fn test_rgb_lsb_roundtrip() {
        let mut img: RgbImage = ImageBuffer::from_pixel(2, 2, Rgb([200, 201, 202]));
        assert_eq!(img.sample_count(), 12);
        assert_eq!(img.lsb(0), 0);
        assert_eq!(img.lsb(1), 1);

        img.set_lsb(0, 1);
        img.set_lsb(1, 0);
        assert_eq!(img.get_pixel(0, 0).0, [201, 200, 202]);
    }

    #[test]
    fn test_rgba_skips_alpha() {
        let mut img: RgbaImage = ImageBuffer::from_pixel(2, 1, Rgba([10, 10, 10, 255]));
        assert_eq!(img.sample_count(), 6);

        for i in 0..6 {
            img.set_lsb(i, 1);
        }
        assert_eq!(img.get_pixel(0, 0).0, [11, 11, 11, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [11, 11, 11, 255]);
    }

    #[test]
    fn test_audio_lsb_on_negative_samples() {
        let mut samples: Vec<i16> = vec![-3, -4, 5];
        samples.set_lsb(0, 0);
        samples.set_lsb(1, 1);
        assert_eq!(samples, vec![-4, -3, 5]);
        assert_eq!(samples.lsb(2), 1);
    }

    #[test]
    fn test_frame_stack_addressing() {
        let frames = vec![
            ImageBuffer::from_pixel(2, 2, Rgb([0, 0, 0])),
            ImageBuffer::from_pixel(2, 2, Rgb([0, 0, 0])),
        ];
        let mut stack = FrameStack::new(frames).unwrap();
        assert_eq!(stack.samples_per_frame(), 12);
        assert_eq!(stack.sample_count(), 24);
        assert_eq!(stack.frames_spanned(13), 2);

        stack.set_lsb(12, 1);
        assert_eq!(stack.frames()[1].get_pixel(0, 0).0, [1, 0, 0]);
        assert_eq!(stack.frames()[0].get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_frame_stack_rejects_mixed_sizes() {
        let frames = vec![
            ImageBuffer::from_pixel(2, 2, Rgb([0, 0, 0])),
            ImageBuffer::from_pixel(3, 2, Rgb([0, 0, 0])),
        ];
        assert!(FrameStack::new(frames).is_none());
    }
}
