use pixel_engine::{scaled_dimensions, DitherRatio, Interpolation, DEFAULT_MAX_COLORS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_RESIZE_FACTOR: u32 = 1;
pub const MAX_RESIZE_FACTOR: u32 = 200;
pub const MIN_MAX_COLORS: usize = 2;
pub const MAX_MAX_COLORS: usize = 256;

/// Interpolation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMode {
    #[default]
    Nearest,
    Bilinear,
    Bicubic,
    PixelArt,
}

impl From<InterpolationMode> for Interpolation {
    fn from(mode: InterpolationMode) -> Self {
        match mode {
            InterpolationMode::Nearest => Interpolation::Nearest,
            InterpolationMode::Bilinear => Interpolation::Bilinear,
            InterpolationMode::Bicubic => Interpolation::Bicubic,
            InterpolationMode::PixelArt => Interpolation::PixelArt,
        }
    }
}

/// Color reduction applied after resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    #[default]
    None,
    OrderedDitherBayer,
    FloydSteinberg,
}

impl ColorMode {
    /// Whether this mode runs a dithering stage.
    pub fn dithers(self) -> bool {
        !matches!(self, ColorMode::None)
    }
}

/// Quality preset trading speed for resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    Fast,
    #[default]
    Balanced,
    HighQuality,
}

/// An unrecognized enum value on the command line or in a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}', expected one of: {}", expected.join(", "))]
pub struct ParseParamError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

macro_rules! kebab_enum {
    ($ty:ty, $kind:literal, [$($variant:path => $name:literal),+ $(,)?]) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseParamError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(ParseParamError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: &[$($name),+],
                    }),
                }
            }
        }
    };
}

kebab_enum!(InterpolationMode, "interpolation", [
    InterpolationMode::Nearest => "nearest",
    InterpolationMode::Bilinear => "bilinear",
    InterpolationMode::Bicubic => "bicubic",
    InterpolationMode::PixelArt => "pixel-art",
]);

kebab_enum!(ColorMode, "color mode", [
    ColorMode::None => "none",
    ColorMode::OrderedDitherBayer => "ordered-dither-bayer",
    ColorMode::FloydSteinberg => "floyd-steinberg",
]);

kebab_enum!(Quality, "quality", [
    Quality::Fast => "fast",
    Quality::Balanced => "balanced",
    Quality::HighQuality => "high-quality",
]);

/// Parameters of one conversion job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionParams {
    /// Target size as a percentage of the source
    #[serde(default = "default_resize_factor")]
    pub resize_factor: u32,

    #[serde(default)]
    pub interpolation: InterpolationMode,

    #[serde(default)]
    pub color_mode: ColorMode,

    #[serde(default = "default_dithering_ratio")]
    pub dithering_ratio: f32,

    #[serde(default)]
    pub quality: Quality,

    #[serde(default = "default_max_colors")]
    pub max_colors: usize,
}

fn default_resize_factor() -> u32 {
    100
}

fn default_dithering_ratio() -> f32 {
    1.0
}

fn default_max_colors() -> usize {
    DEFAULT_MAX_COLORS
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            resize_factor: default_resize_factor(),
            interpolation: InterpolationMode::default(),
            color_mode: ColorMode::default(),
            dithering_ratio: default_dithering_ratio(),
            quality: Quality::default(),
            max_colors: default_max_colors(),
        }
    }
}

impl ConversionParams {
    /// Clamp every numeric field into its valid range.
    pub fn normalized(&self) -> Self {
        Self {
            resize_factor: self
                .resize_factor
                .clamp(MIN_RESIZE_FACTOR, MAX_RESIZE_FACTOR),
            dithering_ratio: DitherRatio::new(self.dithering_ratio).value(),
            max_colors: self.max_colors.clamp(MIN_MAX_COLORS, MAX_MAX_COLORS),
            ..self.clone()
        }
    }

    pub fn dither_ratio(&self) -> DitherRatio {
        DitherRatio::new(self.dithering_ratio)
    }

    /// Output dimensions for a `width` x `height` source.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let factor = self
            .resize_factor
            .clamp(MIN_RESIZE_FACTOR, MAX_RESIZE_FACTOR);
        scaled_dimensions(width, height, factor)
    }
}
