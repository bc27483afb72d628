//! Deterministic output encoding and content hashing.
//!
//! Encoder parameters are fixed per format so the same pixels, format and
//! quality always produce the same bytes:
//! - jpeg: baseline encoder, RGB, encoder-default chroma subsampling
//! - webp: lossless VP8L, RGBA when the canvas carries transparency

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use sha2::{Digest, Sha256};

use crate::error::{RedactError, RedactResult};
use crate::models::region::OutputFormat;

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Encoded output and its content hash.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

/// Encode `pixels` to `format` at `quality` (1..=100).
pub fn encode(pixels: &RgbaImage, format: OutputFormat, quality: u8) -> RedactResult<EncodedImage> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(RedactError::validation(format!(
            "quality must be between {MIN_QUALITY} and {MAX_QUALITY}, got {quality}"
        )));
    }

    let mut buffer = Cursor::new(Vec::new());
    let (width, height) = pixels.dimensions();

    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, quality)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| RedactError::pipeline(format!("jpeg encoding failed: {e}")))?;
        }
        OutputFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            if has_transparency(pixels) {
                encoder
                    .write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| RedactError::pipeline(format!("webp encoding failed: {e}")))?;
            } else {
                let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
                encoder
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| RedactError::pipeline(format!("webp encoding failed: {e}")))?;
            }
        }
    }

    let bytes = buffer.into_inner();
    let content_hash = content_hash(&bytes);
    Ok(EncodedImage {
        bytes,
        content_hash,
    })
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn has_transparency(pixels: &RgbaImage) -> bool {
    pixels.pixels().any(|p| p[3] != 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(32, 24, |x, y| Rgba([(x * 8) as u8, (y * 10) as u8, 128, 255]))
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let pixels = sample();
        for format in [OutputFormat::Jpeg, OutputFormat::Webp] {
            let a = encode(&pixels, format, 80).unwrap();
            let b = encode(&pixels, format, 80).unwrap();
            assert_eq!(a.bytes, b.bytes, "{format} output differs");
            assert_eq!(a.content_hash, b.content_hash);
        }
    }

    #[test]
    fn test_hash_covers_encoded_bytes() {
        let encoded = encode(&sample(), OutputFormat::Jpeg, 90).unwrap();
        assert_eq!(encoded.content_hash, content_hash(&encoded.bytes));
        assert_eq!(encoded.content_hash.len(), 64);
    }

    #[test]
    fn test_output_decodes_with_same_dimensions() {
        for format in [OutputFormat::Jpeg, OutputFormat::Webp] {
            let encoded = encode(&sample(), format, 75).unwrap();
            let decoded = image::load_from_memory(&encoded.bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (32, 24));
        }
    }

    #[test]
    fn test_lossless_webp_preserves_pixels() {
        let mut pixels = sample();
        pixels.put_pixel(0, 0, Rgba([0x11, 0x22, 0x33, 255]));
        let encoded = encode(&pixels, OutputFormat::Webp, 80).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn test_webp_keeps_alpha() {
        let pixels = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 100]));
        let encoded = encode(&pixels, OutputFormat::Webp, 80).unwrap();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(2, 2), Rgba([10, 20, 30, 100]));
    }

    #[test]
    fn test_quality_bounds() {
        assert!(encode(&sample(), OutputFormat::Jpeg, 0).is_err());
        assert!(encode(&sample(), OutputFormat::Jpeg, 101).is_err());
        assert!(encode(&sample(), OutputFormat::Jpeg, 1).is_ok());
    }

    #[test]
    fn test_different_quality_changes_jpeg() {
        let low = encode(&sample(), OutputFormat::Jpeg, 10).unwrap();
        let high = encode(&sample(), OutputFormat::Jpeg, 95).unwrap();
        assert_ne!(low.content_hash, high.content_hash);
    }
}
