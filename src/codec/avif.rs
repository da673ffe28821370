//! AVIF encoder.
//!
//! Request quality (0-100) is first mapped onto the AV1 quantizer scale,
//! where 0 is best and 63 is worst, then handed to rav1e through ravif.

use bytes::Bytes;
use image::DynamicImage;

use super::Encoder;
use crate::error::CodecError;
use crate::format::ImageFormat;

/// Worst quantizer level on the AV1 scale.
pub const AVIF_MAX_QUANTIZER: u8 = 63;

/// rav1e speed preset: 1 is slowest, 10 fastest.
const ENCODER_SPEED: u8 = 8;

/// Lowest quality ravif accepts.
const MIN_RAVIF_QUALITY: f32 = 1.0;

/// Map a 0-100 quality onto the inverted 0-63 quantizer scale.
///
/// 100 gives 0 (best), 0 gives 63 (worst).
#[inline]
pub fn avif_quantizer(quality: f32) -> u8 {
    let scaled = (quality.clamp(0.0, 100.0) / 100.0 * AVIF_MAX_QUANTIZER as f32).floor() as u8;
    AVIF_MAX_QUANTIZER - scaled
}

/// Quantizer level back onto ravif's 1-100 quality scale.
fn ravif_quality(quantizer: u8) -> f32 {
    let level = (AVIF_MAX_QUANTIZER - quantizer.min(AVIF_MAX_QUANTIZER)) as f32;
    (level / AVIF_MAX_QUANTIZER as f32 * 100.0).max(MIN_RAVIF_QUALITY)
}

#[derive(Debug, Clone, Default)]
pub struct AvifEncoder {}

impl AvifEncoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Encoder for AvifEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Avif
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Bytes, CodecError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let pixels: Vec<rgb::RGBA8> = rgba
            .as_raw()
            .chunks_exact(4)
            .map(|p| rgb::RGBA8::new(p[0], p[1], p[2], p[3]))
            .collect();
        let buffer = ravif::Img::new(pixels.as_slice(), width as usize, height as usize);

        let encoded = ravif::Encoder::new()
            .with_quality(ravif_quality(avif_quantizer(quality)))
            .with_speed(ENCODER_SPEED)
            .encode_rgba(buffer)
            .map_err(|e| CodecError::Encode {
                message: format!("ravif: {}", e),
            })?;

        Ok(Bytes::from(encoded.avif_file))
    }
}
