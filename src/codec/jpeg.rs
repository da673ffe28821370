//! JPEG encoder.
//!
//! Quality is passed through to the encoder, truncated to an integer and
//! clamped to the 1-100 range libjpeg accepts. JPEG has no alpha channel,
//! so images are flattened to RGB before encoding.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::DynamicImage;

use super::Encoder;
use crate::error::CodecError;
use crate::format::ImageFormat;

/// Minimum quality accepted by the JPEG encoder.
const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum quality accepted by the JPEG encoder.
const MAX_JPEG_QUALITY: u8 = 100;

/// Map a 0-100 quality onto the encoder's integer scale.
///
/// Fractional parts are truncated; 0 is raised to 1.
#[inline]
pub fn jpeg_quality(quality: f32) -> u8 {
    let truncated = quality.clamp(0.0, 100.0) as u8;
    truncated.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

#[derive(Debug, Clone, Default)]
pub struct JpegEncoder {}

impl JpegEncoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Encoder for JpegEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Bytes, CodecError> {
        let rgb = image.to_rgb8();

        let mut output = Vec::new();
        let mut encoder = ImageJpegEncoder::new_with_quality(&mut output, jpeg_quality(quality));

        encoder
            .encode_image(&rgb)
            .map_err(|e| CodecError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}
