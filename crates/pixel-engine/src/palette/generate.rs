//! Palette generation by coarse quantization and frequency ranking.

use std::collections::HashMap;

use super::palette::Palette;
use crate::buffer::{PixelBuffer, Rgb};

/// Default palette size.
pub const DEFAULT_MAX_COLORS: usize = 16;

/// Channel bucket width used for coarse quantization.
pub const QUANT_STEP: u16 = 32;

/// Snap a channel to the nearest multiple of [`QUANT_STEP`], capped at 255.
#[inline]
pub fn quantize_channel(value: u8) -> u8 {
    let snapped = (value as u16 + QUANT_STEP / 2) / QUANT_STEP * QUANT_STEP;
    snapped.min(255) as u8
}

/// Derive a palette of at most `max_colors` colors from `image`.
///
/// Every pixel is snapped to the 32-step grid, snapped colors are counted,
/// and the most frequent ones are kept. Equal counts keep raster order of
/// first appearance, so the result is deterministic.
pub fn generate_palette(image: &PixelBuffer, max_colors: usize) -> Palette {
    // color -> (count, first seen)
    let mut counts: HashMap<Rgb, (u32, usize)> = HashMap::new();
    for (i, px) in image.as_bytes().chunks_exact(3).enumerate() {
        let key = [
            quantize_channel(px[0]),
            quantize_channel(px[1]),
            quantize_channel(px[2]),
        ];
        counts.entry(key).or_insert((0, i)).0 += 1;
    }

    let mut ranked: Vec<(Rgb, u32, usize)> = counts
        .into_iter()
        .map(|(color, (count, first))| (color, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut palette = Palette::with_capacity(max_colors);
    for (color, _, _) in ranked.into_iter().take(palette.capacity()) {
        palette.push(color);
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantize_channel() {
        assert_eq!(quantize_channel(0), 0);
        assert_eq!(quantize_channel(15), 0);
        assert_eq!(quantize_channel(16), 32);
        assert_eq!(quantize_channel(100), 96);
        assert_eq!(quantize_channel(240), 255);
        assert_eq!(quantize_channel(255), 255);
    }

    #[test]
    fn test_solid_red_palette() {
        let image = PixelBuffer::solid(10, 10, [255, 0, 0]).unwrap();
        let palette = generate_palette(&image, DEFAULT_MAX_COLORS);
        assert_eq!(palette.to_hex(), vec!["#ff0000"]);
    }

    #[test]
    fn test_ranked_by_frequency() {
        // 6 blue, 3 white, 1 black
        let image = PixelBuffer::from_fn(10, 1, |x, _| match x {
            0 => [0, 0, 0],
            1..=3 => [255, 255, 255],
            _ => [0, 0, 255],
        })
        .unwrap();
        let palette = generate_palette(&image, 2);
        assert_eq!(palette.colors(), &[[0, 0, 255], [255, 255, 255]]);
    }

    #[test]
    fn test_ties_keep_first_appearance() {
        let image = PixelBuffer::from_fn(4, 1, |x, _| [(x * 64) as u8, 0, 0]).unwrap();
        let palette = generate_palette(&image, 16);
        assert_eq!(palette.colors(), &[[0, 0, 0], [64, 0, 0], [128, 0, 0], [192, 0, 0]]);
    }

    proptest! {
        #[test]
        fn prop_palette_respects_cap(
            w in 1u32..40,
            h in 1u32..40,
            seed in any::<u32>(),
            max_colors in 1usize..64,
        ) {
            let image = PixelBuffer::from_fn(w, h, |x, y| {
                let v = seed.wrapping_mul(2654435761).wrapping_add(x * 97 + y * 31);
                [v as u8, (v >> 8) as u8, (v >> 16) as u8]
            }).unwrap();
            let palette = generate_palette(&image, max_colors);
            prop_assert!(palette.len() <= max_colors);
            prop_assert!(!palette.is_empty());
            let mut seen = std::collections::HashSet::new();
            for c in palette.colors() {
                prop_assert!(seen.insert(*c), "duplicate color {:?}", c);
            }
        }

        #[test]
        fn prop_default_cap_is_sixteen(seed in any::<u32>()) {
            let image = PixelBuffer::from_fn(32, 32, |x, y| {
                let v = seed ^ (x * 8 + y * 256);
                [v as u8, (v >> 3) as u8, (v >> 6) as u8]
            }).unwrap();
            prop_assert!(generate_palette(&image, DEFAULT_MAX_COLORS).len() <= 16);
        }
    }
}
