//! Coordinate resolution.
//!
//! Converts a region's declared coordinates into a pixel rectangle that is
//! guaranteed to lie inside the image:
//! - `0 <= x < width`, `0 <= y < height`
//! - `x + w <= width`, `y + h <= height`
//! - `w, h >= 1`

use crate::error::{RedactError, RedactResult};
use crate::models::region::{Coordinates, PixelRect, UnitRect};

/// Resolve coordinates against an image of `image_width` x `image_height`.
pub fn resolve(
    coordinates: &Coordinates,
    image_width: u32,
    image_height: u32,
) -> RedactResult<PixelRect> {
    if image_width == 0 || image_height == 0 {
        return Err(RedactError::InvalidRegion(format!(
            "image has no area ({image_width}x{image_height})"
        )));
    }

    match coordinates {
        Coordinates::Pixel(rect) => Ok(clamp_pixel(rect, image_width, image_height)),
        Coordinates::Normalized(rect) => resolve_unit(rect, image_width, image_height),
    }
}

/// Clamp the origin into the image, then shrink the extent to the
/// remaining space. Never produces a zero-area rectangle.
fn clamp_pixel(rect: &PixelRect, image_width: u32, image_height: u32) -> PixelRect {
    let x = rect.x.min(image_width - 1);
    let y = rect.y.min(image_height - 1);
    let width = rect.width.clamp(1, image_width - x);
    let height = rect.height.clamp(1, image_height - y);

    PixelRect {
        x,
        y,
        width,
        height,
    }
}

fn resolve_unit(rect: &UnitRect, image_width: u32, image_height: u32) -> RedactResult<PixelRect> {
    let x = scale(rect.x, image_width);
    let y = scale(rect.y, image_height);
    let width = scale(rect.w, image_width);
    let height = scale(rect.h, image_height);

    if width == 0 || height == 0 {
        return Err(RedactError::InvalidRegion(format!(
            "normalized extent ({}, {}) rounds to an empty rectangle",
            rect.w, rect.h
        )));
    }

    // Rounding can land the origin on the far edge; pull it back like a pixel rect.
    let x = x.min(u64::from(image_width - 1)) as u32;
    let y = y.min(u64::from(image_height - 1)) as u32;
    Ok(PixelRect {
        x,
        y,
        width: width.min(u64::from(image_width - x)) as u32,
        height: height.min(u64::from(image_height - y)) as u32,
    })
}

fn scale(fraction: f64, dimension: u32) -> u64 {
    let value = (fraction.clamp(0.0, 1.0) * f64::from(dimension)).round();
    value as u64
}
