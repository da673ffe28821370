//! WEBP encoding through libwebp.

use bytes::Bytes;
use image::DynamicImage;

use super::Encoder;
use crate::error::CodecError;
use crate::format::ImageFormat;

/// Quality value that switches the encoder to lossless mode.
const LOSSLESS_QUALITY: f32 = 100.0;

/// WebP encoder backed by libwebp.
///
/// Quality 100 requests lossless compression; anything lower is lossy at
/// that quality on libwebp's own 0-100 scale.
#[derive(Debug, Clone, Default)]
pub struct WebpEncoder {}

impl WebpEncoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Encoder for WebpEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Webp
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Bytes, CodecError> {
        let rgba = image.to_rgba8();
        let encoder = ::webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());

        let lossless = quality >= LOSSLESS_QUALITY;
        let memory = encoder
            .encode_simple(lossless, quality.clamp(0.0, 100.0))
            .map_err(|e| CodecError::Encode {
                message: format!("libwebp: {:?}", e),
            })?;

        Ok(Bytes::copy_from_slice(&memory))
    }
}
