//! Dithering: ordered (Bayer) and Floyd-Steinberg error diffusion.
//!
//! # Ordered dithering
//!
//! Each pixel is perturbed by a spatial threshold taken from a
//! [`BayerMatrix`] and then snapped to the nearest palette color using
//! BT.601-weighted distance. Pixels are independent of each other, so the
//! image can be split into row bands and processed in parallel as long as
//! each band knows its absolute starting row.
//!
//! # Error diffusion
//!
//! [`floyd_steinberg`] walks the image in raster order and pushes each
//! pixel's quantization residual onto its unprocessed neighbors:
//!
//! ```text
//!        X   7
//!    3   5   1      (/16)
//! ```
//!
//! It is inherently sequential and always runs on the whole image.

mod bayer;
mod floyd_steinberg;
mod ordered;

pub use bayer::{bayer4, bayer8, BayerMatrix};
pub use floyd_steinberg::floyd_steinberg;
pub use ordered::{ordered_dither, ordered_dither_rows, ORDERED_SCALE};

/// Lower bound of the dithering ratio.
pub const MIN_DITHER_RATIO: f32 = 0.1;
/// Upper bound of the dithering ratio.
pub const MAX_DITHER_RATIO: f32 = 5.0;

/// Strength multiplier for ordered dithering, normalized to
/// `[0.1, 5.0]` in steps of 0.1.
///
/// # Example
///
/// ```
/// use pixel_engine::DitherRatio;
///
/// assert_eq!(DitherRatio::new(6.0).value(), 5.0);
/// assert_eq!(DitherRatio::new(0.05).value(), 0.1);
/// assert_eq!(DitherRatio::new(1.23).value(), 1.2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DitherRatio(f32);

impl DitherRatio {
    /// Clamp into range and snap to the nearest 0.1. Non-finite input
    /// falls back to 1.0.
    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::default();
        }
        let clamped = value.clamp(MIN_DITHER_RATIO, MAX_DITHER_RATIO);
        Self((clamped * 10.0).round() / 10.0)
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for DitherRatio {
    fn default() -> Self {
        Self(1.0)
    }
}

impl From<f32> for DitherRatio {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_normalization() {
        assert_eq!(DitherRatio::new(6.0).value(), 5.0);
        assert_eq!(DitherRatio::new(0.05).value(), 0.1);
        assert_eq!(DitherRatio::new(1.23).value(), 1.2);
        assert_eq!(DitherRatio::new(1.25).value(), 1.3);
        assert_eq!(DitherRatio::new(0.1).value(), 0.1);
        assert_eq!(DitherRatio::new(5.0).value(), 5.0);
    }

    #[test]
    fn test_ratio_non_finite_defaults() {
        assert_eq!(DitherRatio::new(f32::NAN).value(), 1.0);
        assert_eq!(DitherRatio::new(f32::INFINITY).value(), 1.0);
    }

    #[test]
    fn test_ratio_always_in_bounds() {
        for i in -100..200 {
            let v = DitherRatio::new(i as f32 * 0.037).value();
            assert!((MIN_DITHER_RATIO..=MAX_DITHER_RATIO).contains(&v), "{v}");
        }
    }
}
