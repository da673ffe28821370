//! Image pipeline.
//!
//! Turns stored source bytes into a rendition:
//!
//! ```text
//! source bytes ──► decode ──► transforms ──► encode ──► Bytes
//!                  (image)    (resize)       (CodecRegistry)
//! ```
//!
//! The pipeline is synchronous and CPU-bound; [`ImageService`] runs it on
//! the blocking pool.

pub mod resize;
mod service;

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, ImageReader, Limits};

use crate::codec::CodecRegistry;
use crate::error::CodecError;
use crate::format::ImageFormat;

pub use resize::{check_pixel_budget, resize_to_width, target_dimensions, RESIZE_FILTER};

/// Default output pixel budget: 40 megapixels (about 8000x5000).
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 40_000_000;

/// Largest source width or height the decoder accepts.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Largest allocation the decoder may make: 512MB
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;
pub use service::{ImageService, ProcessRequest, ProcessedImage};

/// A step applied between decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Scale to this width, preserving aspect ratio; 0 leaves the image as is
    Resize(u32),
}

impl Transform {
    fn apply(&self, image: DynamicImage, max_pixels: u64) -> Result<DynamicImage, CodecError> {
        match *self {
            Transform::Resize(width) => resize_to_width(image, width, max_pixels),
        }
    }
}

/// Decode, transform and re-encode images.
pub struct ImagePipeline {
    codecs: Arc<CodecRegistry>,
    max_output_pixels: u64,
}

impl ImagePipeline {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }

    /// Cap the pixel count of any rendition.
    pub fn with_max_output_pixels(mut self, max_output_pixels: u64) -> Self {
        self.max_output_pixels = max_output_pixels;
        self
    }

    pub fn max_output_pixels(&self) -> u64 {
        self.max_output_pixels
    }

    /// The registry used for encoding.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Run `source` through `transforms` and encode it as `format`.
    ///
    /// # Errors
    ///
    /// - [`CodecError::UnsupportedFormat`] when `format` has no encoder,
    ///   reported before the source is decoded
    /// - [`CodecError::Decode`] when the source is not a decodable image or
    ///   exceeds the decoder limits
    /// - [`CodecError::TooLarge`] when a transform would exceed the output
    ///   pixel budget
    /// - [`CodecError::Encode`] when the target codec fails
    pub fn process(
        &self,
        source: &[u8],
        transforms: &[Transform],
        quality: f32,
        format: ImageFormat,
    ) -> Result<Bytes, CodecError> {
        let encoder = self.codecs.encoder(format)?;

        let mut image = decode(source)?;

        for transform in transforms {
            image = transform.apply(image, self.max_output_pixels)?;
        }

        encoder.encode(&image, quality)
    }
}

/// Decode with explicit dimension and allocation limits.
fn decode(source: &[u8]) -> Result<DynamicImage, CodecError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(decode_error)?;
    reader.limits(limits);
    reader.decode().map_err(decode_error)
}

fn decode_error(err: impl std::fmt::Display) -> CodecError {
    CodecError::Decode {
        message: err.to_string(),
    }
}
