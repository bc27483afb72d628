use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Slack for float sums like `0.7 + 0.3` in unit-interval checks.
const UNIT_EPSILON: f64 = 1e-9;

/// A rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PixelRect {
    #[garde(skip)]
    pub x: u32,
    #[garde(skip)]
    pub y: u32,
    #[garde(range(min = 1))]
    pub width: u32,
    #[garde(range(min = 1))]
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A rectangle expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct UnitRect {
    #[garde(range(min = 0.0, max = 1.0))]
    pub x: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub y: f64,
    #[garde(range(min = 0.0, max = 1.0), custom(fits_unit_interval(self.x)))]
    pub w: f64,
    #[garde(range(min = 0.0, max = 1.0), custom(fits_unit_interval(self.y)))]
    pub h: f64,
}

fn fits_unit_interval(origin: f64) -> impl FnOnce(&f64, &()) -> garde::Result {
    move |extent, _| {
        if origin + *extent <= 1.0 + UNIT_EPSILON {
            Ok(())
        } else {
            Err(garde::Error::new(format!(
                "origin {origin} plus extent {extent} exceeds 1.0"
            )))
        }
    }
}

/// Region coordinates. The representation is always declared by the
/// `type` tag, never inferred from the magnitude of the values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Coordinates {
    Pixel(#[garde(dive)] PixelRect),
    #[serde(alias = "unit")]
    Normalized(#[garde(dive)] UnitRect),
}

/// Strength preset shared by blur and pixelate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionSize {
    #[serde(alias = "s")]
    Small,
    #[serde(alias = "m")]
    Medium,
    #[serde(alias = "l")]
    Large,
}

impl RegionSize {
    /// Gaussian sigma for blur.
    pub fn sigma(self) -> f32 {
        match self {
            RegionSize::Small => 3.0,
            RegionSize::Medium => 6.0,
            RegionSize::Large => 12.0,
        }
    }

    /// Block edge length in pixels for pixelate.
    pub fn block(self) -> u32 {
        match self {
            RegionSize::Small => 6,
            RegionSize::Medium => 12,
            RegionSize::Large => 24,
        }
    }
}

/// An RGBA colour parsed from `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FillColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl FillColor {
    pub fn parse(value: &str) -> Result<Self, String> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) || !(hex.len() == 6 || hex.len() == 8) {
            return Err(format!(
                "invalid color '{value}': expected #RRGGBB or #RRGGBBAA"
            ));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("invalid color '{value}': {e}"))
        };

        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 255 },
        })
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl TryFrom<String> for FillColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FillColor> for String {
    fn from(color: FillColor) -> Self {
        if color.a == 255 {
            format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", color.r, color.g, color.b, color.a)
        }
    }
}

/// Redaction applied to a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Blur { size: RegionSize },
    Pixelate { size: RegionSize },
    Fill { color: FillColor },
}

/// A rectangular area of an image paired with one redaction operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Region {
    #[garde(dive)]
    pub coordinates: Coordinates,
    #[garde(skip)]
    pub operation: Operation,
}

/// Output encodings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Webp,
    #[serde(alias = "jpg")]
    #[strum(to_string = "jpeg", serialize = "jpg")]
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}
