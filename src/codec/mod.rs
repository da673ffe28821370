//! Codec registry.
//!
//! One [`Encoder`] per output format, selected by [`ImageFormat`]. The
//! registry is built once at startup and shared behind an `Arc`; encoders
//! hold no per-call state, so concurrent use needs no locking.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CodecRegistry                 │
//! │   Webp ─► WebpEncoder   (libwebp)            │
//! │   Avif ─► AvifEncoder   (ravif, 0-63 scale)  │
//! │   Jpeg ─► JpegEncoder   (image crate)        │
//! │   Png  ─► PngEncoder    (image crate)        │
//! │   Svg  ─► (none, pass-through only)          │
//! └──────────────────────────────────────────────┘
//! ```

mod avif;
mod jpeg;
mod png;
mod webp;

use std::collections::HashMap;

use bytes::Bytes;
use image::DynamicImage;

use crate::error::CodecError;
use crate::format::ImageFormat;

pub use avif::{avif_quantizer, AvifEncoder, AVIF_MAX_QUANTIZER};
pub use jpeg::{jpeg_quality, JpegEncoder};
pub use png::PngEncoder;
pub use self::webp::WebpEncoder;

/// Encodes a decoded image into one output format.
pub trait Encoder: Send + Sync {
    /// The format this encoder produces.
    fn format(&self) -> ImageFormat;

    /// Encode `image` at `quality` (0-100). Encoders for lossless formats
    /// ignore the quality.
    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Bytes, CodecError>;
}

/// Maps each output format to its encoder.
pub struct CodecRegistry {
    encoders: HashMap<ImageFormat, Box<dyn Encoder>>,
}

impl CodecRegistry {
    /// Registry with the WEBP, AVIF, JPEG and PNG encoders.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(WebpEncoder::new()));
        registry.register(Box::new(AvifEncoder::new()));
        registry.register(Box::new(JpegEncoder::new()));
        registry.register(Box::new(PngEncoder::new()));
        registry
    }

    /// Registry with no encoders.
    pub fn empty() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// Add an encoder, replacing any previous one for the same format.
    pub fn register(&mut self, encoder: Box<dyn Encoder>) {
        self.encoders.insert(encoder.format(), encoder);
    }

    /// Look up the encoder for `format`.
    pub fn encoder(&self, format: ImageFormat) -> Result<&dyn Encoder, CodecError> {
        self.encoders
            .get(&format)
            .map(|e| e.as_ref())
            .ok_or(CodecError::UnsupportedFormat(format))
    }

    /// Whether an encoder exists for `format`.
    pub fn supports(&self, format: ImageFormat) -> bool {
        self.encoders.contains_key(&format)
    }

    /// Encode `image` into `format`.
    pub fn encode(
        &self,
        format: ImageFormat,
        image: &DynamicImage,
        quality: f32,
    ) -> Result<Bytes, CodecError> {
        self.encoder(format)?.encode(image, quality)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
