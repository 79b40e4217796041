//! Image carriers for pixel-domain embedding.
//!
//! Loads PNG, BMP and TIFF images (lossless formats only) into an 8-bit RGB
//! or RGBA buffer. Alpha is preserved but never carries payload bits.

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use crate::error::StegoError;
use crate::plan::LsbParams;

use super::lsb;
use super::samples::SampleMatrix;

/// Pixel storage, chosen by whether the source has an alpha channel.
#[derive(Debug, Clone)]
enum Pixels {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

/// An image loaded for LSB embedding.
#[derive(Debug, Clone)]
pub struct ImageCarrier {
    pixels: Pixels,
    format: ImageFormat,
}

impl ImageCarrier {
    /// Loads an image file; the format is guessed from its contents.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StegoError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Decodes an image from memory. Trailing bytes after the image data
    /// (append layers) are ignored by the decoders.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StegoError> {
        let format = image::guess_format(bytes)?;
        if !is_lossless(format) {
            return Err(StegoError::UnsupportedCarrier(format!(
                "{format:?} is lossy; pixel embedding needs PNG, BMP or TIFF"
            )));
        }
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self::from_image(image, format))
    }

    pub fn from_image(image: DynamicImage, format: ImageFormat) -> Self {
        let pixels = if image.color().has_alpha() {
            Pixels::Rgba(image.to_rgba8())
        } else {
            Pixels::Rgb(image.to_rgb8())
        };
        Self { pixels, format }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &self.pixels {
            Pixels::Rgb(img) => img.dimensions(),
            Pixels::Rgba(img) => img.dimensions(),
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn capacity_bits(&self, params: &LsbParams) -> usize {
        lsb::capacity_bits(self, params)
    }

    /// Returns a copy of this image with `data` embedded.
    pub fn hide(&self, data: &[u8], params: &LsbParams) -> Result<Self, StegoError> {
        let mut out = self.clone();
        lsb::embed(&mut out, params, data)?;
        Ok(out)
    }

    /// Blind extraction of an embedded frame.
    pub fn extract(&self, preferred: &LsbParams) -> Result<(LsbParams, Vec<u8>), StegoError> {
        lsb::extract(self, preferred)
    }

    /// Encodes the image in its source format.
    pub fn encode(&self) -> Result<Vec<u8>, StegoError> {
        self.encode_as(self.format)
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, StegoError> {
        self.encode_as(ImageFormat::Png)
    }

    fn encode_as(&self, format: ImageFormat) -> Result<Vec<u8>, StegoError> {
        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);
        match &self.pixels {
            Pixels::Rgb(img) => img.write_to(&mut cursor, format)?,
            Pixels::Rgba(img) => img.write_to(&mut cursor, format)?,
        }
        Ok(bytes)
    }

    /// Saves the image in its source format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StegoError> {
        std::fs::write(path, self.encode()?)?;
        Ok(())
    }
}

fn is_lossless(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff)
}

impl SampleMatrix for ImageCarrier {
    fn sample_count(&self) -> usize {
        match &self.pixels {
            Pixels::Rgb(img) => img.sample_count(),
            Pixels::Rgba(img) => img.sample_count(),
        }
    }

    fn lsb(&self, index: usize) -> u8 {
        match &self.pixels {
            Pixels::Rgb(img) => img.lsb(index),
            Pixels::Rgba(img) => img.lsb(index),
        }
    }

    fn set_lsb(&mut self, index: usize, bit: u8) {
        match &mut self.pixels {
            Pixels::Rgb(img) => img.set_lsb(index, bit),
            Pixels::Rgba(img) => img.set_lsb(index, bit),
        }
    }
}
