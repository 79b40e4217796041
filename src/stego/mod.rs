//! Embedding engines and the carriers they operate on.
//!
//! - Pixel-domain LSB over images, PCM samples and video frame stacks
//! - Transform-domain sign coding over WAV audio

pub mod audio;
pub mod image;
pub mod lsb;
pub mod samples;
pub mod transform;
pub mod wavelet;

pub use audio::AudioCarrier;
pub use self::image::ImageCarrier;
pub use lsb::Located;
pub use samples::{FrameStack, SampleMatrix};
pub use transform::TransformCoder;
