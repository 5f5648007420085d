//! Bounded palette with nearest-color matching.

use crate::buffer::Rgb;
use crate::error::EngineError;

/// Hard upper bound on any palette.
pub const MAX_PALETTE_SIZE: usize = 256;

/// Perceptual channel weights (ITU-R BT.601 luma) used by ordered dithering.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// An ordered list of unique colors that never grows past its capacity.
///
/// # Example
///
/// ```
/// use pixel_engine::Palette;
///
/// let palette = Palette::from_colors(&[[0, 0, 0], [255, 255, 255]], 16).unwrap();
/// assert_eq!(palette.len(), 2);
/// assert_eq!(palette.to_hex(), vec!["#000000", "#ffffff"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
    capacity: usize,
}

impl Palette {
    /// Create an empty palette holding at most `capacity` colors.
    ///
    /// The capacity is clamped to `1..=MAX_PALETTE_SIZE`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_PALETTE_SIZE);
        Self {
            colors: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a palette from `colors`, dropping duplicates and anything past
    /// `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyPalette`] if `colors` is empty.
    pub fn from_colors(colors: &[Rgb], capacity: usize) -> Result<Self, EngineError> {
        if colors.is_empty() {
            return Err(EngineError::EmptyPalette);
        }
        let mut palette = Self::with_capacity(capacity);
        for &color in colors {
            palette.push(color);
        }
        Ok(palette)
    }

    /// Append a color. Returns `false` if it is already present or the
    /// palette is full.
    pub fn push(&mut self, color: Rgb) -> bool {
        if self.colors.len() >= self.capacity || self.colors.contains(&color) {
            return false;
        }
        self.colors.push(color);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// Colors as lowercase `#rrggbb` strings.
    pub fn to_hex(&self) -> Vec<String> {
        self.colors.iter().map(|&c| hex(c)).collect()
    }

    /// Index of the closest color by BT.601-weighted squared distance.
    ///
    /// Ties resolve to the lowest index. Returns 0 for an empty palette.
    pub fn nearest_weighted(&self, color: [f32; 3]) -> usize {
        self.nearest_by(color, LUMA_WEIGHTS)
    }

    /// Index of the closest color by plain squared Euclidean distance.
    pub fn nearest_euclidean(&self, color: [f32; 3]) -> usize {
        self.nearest_by(color, [1.0; 3])
    }

    fn nearest_by(&self, color: [f32; 3], weights: [f32; 3]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::MAX;
        for (i, p) in self.colors.iter().enumerate() {
            let dist: f32 = (0..3)
                .map(|c| {
                    let d = color[c] - p[c] as f32;
                    weights[c] * d * d
                })
                .sum();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }
}

/// Format a color as `#rrggbb`.
pub fn hex(color: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_colors_empty() {
        assert_eq!(Palette::from_colors(&[], 4), Err(EngineError::EmptyPalette));
    }

    #[test]
    fn test_push_rejects_duplicates_and_overflow() {
        let mut palette = Palette::with_capacity(2);
        assert!(palette.push([1, 2, 3]));
        assert!(!palette.push([1, 2, 3]));
        assert!(palette.push([4, 5, 6]));
        assert!(!palette.push([7, 8, 9]));
        assert_eq!(palette.len(), 2);
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(Palette::with_capacity(0).capacity(), 1);
        assert_eq!(Palette::with_capacity(10_000).capacity(), MAX_PALETTE_SIZE);
    }

    #[test]
    fn test_hex_lowercase() {
        assert_eq!(hex([255, 0, 171]), "#ff00ab");
    }

    #[test]
    fn test_nearest_euclidean() {
        let palette = Palette::from_colors(&[[0, 0, 0], [255, 255, 255], [255, 0, 0]], 8).unwrap();
        assert_eq!(palette.nearest_euclidean([20.0, 10.0, 10.0]), 0);
        assert_eq!(palette.nearest_euclidean([240.0, 230.0, 250.0]), 1);
        assert_eq!(palette.nearest_euclidean([200.0, 30.0, 40.0]), 2);
    }

    #[test]
    fn test_weighted_distance_favors_green_accuracy() {
        // Equal Euclidean distance, but green errors weigh more than blue.
        let palette = Palette::from_colors(&[[0, 40, 0], [0, 0, 40]], 8).unwrap();
        let probe = [0.0, 0.0, 0.0];
        assert_eq!(palette.nearest_euclidean(probe), 0);
        assert_eq!(palette.nearest_weighted(probe), 1);
    }
}
