//! Region compositing onto an in-memory canvas.
//!
//! Operations mutate the canvas in place, in the order given. Each operation
//! reads the pixels left by the previous ones, so overlapping regions resolve
//! last-write-wins.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::models::region::{FillColor, Operation, PixelRect};

/// Mutable RGBA buffer addressed by pixel rectangles.
#[derive(Debug, Clone)]
pub struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Apply every `(rect, operation)` pair in list order.
    pub fn apply_all<'a>(&mut self, regions: impl IntoIterator<Item = &'a (PixelRect, Operation)>) {
        for (rect, operation) in regions {
            self.apply(rect, operation);
        }
    }

    /// Apply one operation. `rect` must already be resolved to image bounds.
    pub fn apply(&mut self, rect: &PixelRect, operation: &Operation) {
        debug_assert!(rect.x + rect.width <= self.width());
        debug_assert!(rect.y + rect.height <= self.height());

        match operation {
            Operation::Blur { size } => self.blur(rect, size.sigma()),
            Operation::Pixelate { size } => self.pixelate(rect, size.block()),
            Operation::Fill { color } => self.fill(rect, *color),
        }
    }

    fn blur(&mut self, rect: &PixelRect, sigma: f32) {
        let region = self.extract(rect);
        let blurred = imageops::blur(&region, sigma);
        self.write_back(rect, &blurred);
    }

    fn pixelate(&mut self, rect: &PixelRect, block: u32) {
        let region = self.extract(rect);
        let small_w = (rect.width / block).max(1);
        let small_h = (rect.height / block).max(1);

        let small = imageops::resize(&region, small_w, small_h, FilterType::Nearest);
        let blocks = imageops::resize(&small, rect.width, rect.height, FilterType::Nearest);
        self.write_back(rect, &blocks);
    }

    fn fill(&mut self, rect: &PixelRect, color: FillColor) {
        let source = color.to_rgba();
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                let dest = self.pixels.get_pixel_mut(x, y);
                *dest = blend_over(source, *dest);
            }
        }
    }

    fn extract(&self, rect: &PixelRect) -> RgbaImage {
        imageops::crop_imm(&self.pixels, rect.x, rect.y, rect.width, rect.height).to_image()
    }

    fn write_back(&mut self, rect: &PixelRect, region: &RgbaImage) {
        imageops::replace(&mut self.pixels, region, i64::from(rect.x), i64::from(rect.y));
    }
}

/// Integer source-over compositing of `src` onto `dst`.
///
/// An opaque source yields the source colour exactly; a fully transparent
/// source leaves the destination untouched.
fn blend_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let src_a = u32::from(src[3]);
    if src_a == 255 {
        return src;
    }
    if src_a == 0 {
        return dst;
    }

    let dst_a = u32::from(dst[3]);
    let inv = 255 - src_a;
    // Output alpha scaled by 255: a_out = a_s + a_d * (1 - a_s)
    let out_a_255 = src_a * 255 + dst_a * inv;
    if out_a_255 == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |s: u8, d: u8| -> u8 {
        let numerator = u32::from(s) * src_a * 255 + u32::from(d) * dst_a * inv;
        ((numerator + out_a_255 / 2) / out_a_255) as u8
    };

    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        ((out_a_255 + 127) / 255) as u8,
    ])
}
