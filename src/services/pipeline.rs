use std::io::Cursor;
use std::time::Instant;

use image::{ImageFormat, ImageReader};
use serde::Serialize;

use crate::error::{RedactError, RedactResult};
use crate::models::region::{OutputFormat, PixelRect, Region};
use crate::services::compositor::Canvas;
use crate::services::{coordinates, encoder};

/// Ceilings enforced before any pixel work starts.
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    pub max_payload_bytes: usize,
    pub max_pixels: u64,
    pub max_regions: usize,
    pub default_quality: u8,
    pub default_format: OutputFormat,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 25 * 1024 * 1024,
            max_pixels: 50_000_000,
            max_regions: 20,
            default_quality: 85,
            default_format: OutputFormat::Webp,
        }
    }
}

/// One redaction run over an in-memory image.
#[derive(Debug, Clone)]
pub struct RedactionInput<'a> {
    pub source: &'a [u8],
    /// Content type reported by the caller or the object store.
    pub declared_type: Option<&'a str>,
    pub regions: &'a [Region],
    pub format: Option<OutputFormat>,
    pub quality: Option<u8>,
}

/// Result of a successful pipeline run. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedImage {
    #[serde(skip)]
    pub buffer: Vec<u8>,
    pub format: OutputFormat,
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub processing_duration_ms: u64,
}

/// Resolve, composite and encode. Pure with respect to shared state.
#[derive(Debug, Clone, Default)]
pub struct RedactionPipeline {
    limits: PipelineLimits,
}

impl RedactionPipeline {
    pub fn new(limits: PipelineLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    /// Validate region count and shape without touching the image.
    pub fn check_regions(&self, regions: &[Region]) -> RedactResult<()> {
        if regions.is_empty() {
            return Err(RedactError::validation("at least one region is required"));
        }
        if regions.len() > self.limits.max_regions {
            return Err(RedactError::limit(format!(
                "{} regions exceeds the maximum of {}",
                regions.len(),
                self.limits.max_regions
            )));
        }
        for (index, region) in regions.iter().enumerate() {
            garde::Validate::validate(region)
                .map_err(|e| RedactError::validation(format!("region {index}: {e}")))?;
        }
        Ok(())
    }

    pub fn run(&self, input: &RedactionInput<'_>) -> RedactResult<ProcessedImage> {
        let started = Instant::now();

        if input.source.len() > self.limits.max_payload_bytes {
            return Err(RedactError::limit(format!(
                "payload of {} bytes exceeds the maximum of {} bytes",
                input.source.len(),
                self.limits.max_payload_bytes
            )));
        }
        self.check_regions(input.regions)?;

        let source_format = sniff_format(input.source, input.declared_type)?;

        let reader = ImageReader::with_format(Cursor::new(input.source), source_format);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| RedactError::pipeline(format!("unreadable image header: {e}")))?;

        let pixel_count = u64::from(width) * u64::from(height);
        if pixel_count > self.limits.max_pixels {
            return Err(RedactError::limit(format!(
                "image of {width}x{height} ({pixel_count} pixels) exceeds the maximum of {} pixels",
                self.limits.max_pixels
            )));
        }

        let decoded = image::load_from_memory_with_format(input.source, source_format)
            .map_err(|e| RedactError::pipeline(format!("failed to decode image: {e}")))?;

        let resolved = input
            .regions
            .iter()
            .map(|region| {
                coordinates::resolve(&region.coordinates, width, height)
                    .map(|rect| (rect, region.operation))
            })
            .collect::<RedactResult<Vec<(PixelRect, _)>>>()?;

        let mut canvas = Canvas::new(decoded.to_rgba8());
        canvas.apply_all(&resolved);

        let format = input.format.unwrap_or(self.limits.default_format);
        let quality = input.quality.unwrap_or(self.limits.default_quality);
        let encoded = encoder::encode(canvas.pixels(), format, quality)?;

        let processed = ProcessedImage {
            buffer: encoded.bytes,
            format,
            content_hash: encoded.content_hash,
            width,
            height,
            processing_duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            width,
            height,
            regions = resolved.len(),
            format = %format,
            content_hash = %processed.content_hash,
            duration_ms = processed.processing_duration_ms,
            "Redaction pipeline complete"
        );

        Ok(processed)
    }
}

/// Supported input formats.
const SUPPORTED_INPUTS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// Sniff the input format and reconcile it with the declared content type.
pub fn sniff_format(source: &[u8], declared_type: Option<&str>) -> RedactResult<ImageFormat> {
    let sniffed = image::guess_format(source)
        .map_err(|_| RedactError::unsupported("unrecognised image data"))?;

    if !SUPPORTED_INPUTS.contains(&sniffed) {
        return Err(RedactError::unsupported(format!(
            "{sniffed:?} input is not supported"
        )));
    }

    if let Some(declared) = declared_type.map(normalise_mime).filter(|m| is_specific(m)) {
        match ImageFormat::from_mime_type(&declared) {
            Some(format) if format == sniffed => {}
            Some(format) => {
                return Err(RedactError::unsupported(format!(
                    "declared {declared} ({format:?}) does not match {sniffed:?} content"
                )));
            }
            None => {
                return Err(RedactError::unsupported(format!(
                    "declared content type {declared} is not supported"
                )));
            }
        }
    }

    Ok(sniffed)
}

fn normalise_mime(value: &str) -> String {
    let essence = value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase();
    if essence == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        essence
    }
}

/// Generic types carry no format claim and are ignored.
fn is_specific(mime: &str) -> bool {
    !mime.is_empty() && mime != "application/octet-stream" && mime != "binary/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::region::{Coordinates, FillColor, Operation, RegionSize};
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn fill_region(x: u32, y: u32, w: u32, h: u32, color: &str) -> Region {
        Region {
            coordinates: Coordinates::Pixel(PixelRect::new(x, y, w, h)),
            operation: Operation::Fill {
                color: FillColor::parse(color).unwrap(),
            },
        }
    }

    fn input<'a>(source: &'a [u8], regions: &'a [Region]) -> RedactionInput<'a> {
        RedactionInput {
            source,
            declared_type: None,
            regions,
            format: Some(OutputFormat::Webp),
            quality: None,
        }
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let source = png(64, 48);
        let regions = vec![
            Region {
                coordinates: Coordinates::Pixel(PixelRect::new(4, 4, 30, 20)),
                operation: Operation::Blur { size: RegionSize::Small },
            },
            Region {
                coordinates: Coordinates::Pixel(PixelRect::new(20, 10, 30, 30)),
                operation: Operation::Pixelate { size: RegionSize::Small },
            },
        ];
        let pipeline = RedactionPipeline::default();

        for format in [OutputFormat::Webp, OutputFormat::Jpeg] {
            let mut req = input(&source, &regions);
            req.format = Some(format);
            let a = pipeline.run(&req).unwrap();
            let b = pipeline.run(&req).unwrap();
            assert_eq!(a.buffer, b.buffer);
            assert_eq!(a.content_hash, b.content_hash);
            assert_eq!(a.format, format);
        }
    }

    #[test]
    fn test_fill_survives_lossless_output() {
        let source = png(40, 30);
        let regions = vec![fill_region(10, 10, 100, 100, "#112233")];
        let processed = RedactionPipeline::default().run(&input(&source, &regions)).unwrap();

        assert_eq!((processed.width, processed.height), (40, 30));
        let decoded = image::load_from_memory(&processed.buffer).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(39, 29), Rgba([0x11, 0x22, 0x33, 255]));
        assert_eq!(*decoded.get_pixel(9, 9), Rgba([9, 9, 90, 255]));
    }

    #[test]
    fn test_region_count_limits() {
        let source = png(10, 10);
        let pipeline = RedactionPipeline::default();

        let err = pipeline.run(&input(&source, &[])).unwrap_err();
        assert!(matches!(err, RedactError::Validation(_)));

        let many: Vec<Region> = (0..21).map(|_| fill_region(0, 0, 1, 1, "#000000")).collect();
        let err = pipeline.run(&input(&source, &many)).unwrap_err();
        assert!(matches!(err, RedactError::LimitExceeded(_)));
    }

    #[test]
    fn test_pixel_limit_checked_before_decode() {
        let source = png(100, 100);
        let regions = vec![fill_region(0, 0, 1, 1, "#000000")];
        let pipeline = RedactionPipeline::new(PipelineLimits {
            max_pixels: 9_999,
            ..Default::default()
        });
        let err = pipeline.run(&input(&source, &regions)).unwrap_err();
        assert!(matches!(err, RedactError::LimitExceeded(_)));
    }

    #[test]
    fn test_payload_limit() {
        let source = png(50, 50);
        let regions = vec![fill_region(0, 0, 1, 1, "#000000")];
        let pipeline = RedactionPipeline::new(PipelineLimits {
            max_payload_bytes: 16,
            ..Default::default()
        });
        let err = pipeline.run(&input(&source, &regions)).unwrap_err();
        assert_eq!(err.code(), "LIMIT_EXCEEDED");
    }

    #[test]
    fn test_truncated_image_is_pipeline_error() {
        let source = png(32, 32);
        let truncated = &source[..source.len() / 2];
        let regions = vec![fill_region(0, 0, 1, 1, "#000000")];
        let err = RedactionPipeline::default()
            .run(&input(truncated, &regions))
            .unwrap_err();
        assert_eq!(err.code(), "PIPELINE_ERROR");
    }

    #[test]
    fn test_unrecognised_bytes_rejected() {
        let regions = vec![fill_region(0, 0, 1, 1, "#000000")];
        let err = RedactionPipeline::default()
            .run(&input(b"definitely not an image", &regions))
            .unwrap_err();
        assert!(matches!(err, RedactError::UnsupportedMedia(_)));
    }

    #[test]
    fn test_declared_type_mismatch_rejected() {
        let source = png(10, 10);
        assert!(sniff_format(&source, Some("image/png")).is_ok());
        assert!(sniff_format(&source, Some("application/octet-stream")).is_ok());
        assert!(matches!(
            sniff_format(&source, Some("image/jpeg")),
            Err(RedactError::UnsupportedMedia(_))
        ));
        assert!(matches!(
            sniff_format(&source, Some("image/gif")),
            Err(RedactError::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn test_degenerate_normalized_region_fails() {
        let source = png(10, 10);
        let regions = vec![Region {
            coordinates: Coordinates::Normalized(crate::models::region::UnitRect {
                x: 1.0,
                y: 0.0,
                w: 0.0,
                h: 0.5,
            }),
            operation: Operation::Blur { size: RegionSize::Small },
        }];
        let err = RedactionPipeline::default().run(&input(&source, &regions)).unwrap_err();
        assert!(matches!(err, RedactError::InvalidRegion(_)));
    }
}
