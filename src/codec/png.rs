//! Lossless PNG encoding.

use std::io::Cursor;

use bytes::Bytes;
use image::DynamicImage;

use super::Encoder;
use crate::error::CodecError;
use crate::format::ImageFormat;

/// Lossless PNG encoder. The quality argument has no effect.
#[derive(Debug, Clone, Default)]
pub struct PngEncoder {}

impl PngEncoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Encoder for PngEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn encode(&self, image: &DynamicImage, _quality: f32) -> Result<Bytes, CodecError> {
        let mut output = Cursor::new(Vec::new());
        image
            .write_to(&mut output, image::ImageFormat::Png)
            .map_err(|e| CodecError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output.into_inner()))
    }
}
