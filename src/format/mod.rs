//! Image formats and content classification.
//!
//! - [`ImageFormat`]: the closed set of formats the service can emit
//! - [`detect`]: decides whether a byte buffer is a servable image, an HTML
//!   error page, or something else

pub mod detect;

use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

pub use detect::{classify, is_html, is_valid, sniff_image_signature, Validity, SNIFF_LEN};

/// Output format of a processed image.
///
/// `Svg` is a pass-through marker: SVG sources are stored and served
/// verbatim and never rasterized, so it has no encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Webp,
    Avif,
    Jpeg,
    Png,
    Svg,
}

impl ImageFormat {
    /// All formats, in registry order.
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Svg,
    ];

    /// The token used in URLs and file names.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }

    /// MIME type for the `Content-Type` header.
    pub const fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    /// File extension used in `Content-Disposition`.
    pub const fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the quality parameter affects the output.
    pub const fn is_lossy(&self) -> bool {
        matches!(
            self,
            ImageFormat::Webp | ImageFormat::Avif | ImageFormat::Jpeg
        )
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "svg" => Ok(ImageFormat::Svg),
            _ => Err(CodecError::UnknownFormat(s.to_string())),
        }
    }
}
