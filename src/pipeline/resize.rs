//! Width-driven, aspect-preserving resize.

use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::CodecError;

/// Resampling filter for every resize. Catmull-Rom is the cubic the
/// `image` crate offers closest to Mitchell-Netravali.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Compute the output size for a requested width.
///
/// Returns `None` when the image should pass through unchanged: a width of
/// 0, a width equal to the source width, or a degenerate source. Height is
/// `round(src_height * width / src_width)`, never less than 1. Widths larger
/// than the source are allowed.
pub fn target_dimensions(width: u32, src_width: u32, src_height: u32) -> Option<(u32, u32)> {
    if width == 0 || width == src_width || src_width == 0 || src_height == 0 {
        return None;
    }

    let height = (src_height as f64 * width as f64 / src_width as f64).round() as u32;
    Some((width, height.max(1)))
}

/// Reject an output size above `max_pixels`.
pub fn check_pixel_budget(width: u32, height: u32, max_pixels: u64) -> Result<(), CodecError> {
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(CodecError::TooLarge {
            width,
            height,
            max_pixels,
        });
    }
    Ok(())
}

/// Resize `image` to `width`, keeping its aspect ratio.
///
/// The target size is checked against `max_pixels` before the output
/// buffer is allocated.
pub fn resize_to_width(
    image: DynamicImage,
    width: u32,
    max_pixels: u64,
) -> Result<DynamicImage, CodecError> {
    match target_dimensions(width, image.width(), image.height()) {
        Some((w, h)) => {
            check_pixel_budget(w, h, max_pixels)?;
            Ok(image.resize_exact(w, h, RESIZE_FILTER))
        }
        None => Ok(image),
    }
}
