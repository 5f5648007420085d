//! Floyd-Steinberg error diffusion.

use crate::buffer::{PixelBuffer, CHANNELS};
use crate::palette::Palette;

/// Diffusion targets as (dx, dy, weight/16).
const KERNEL: [(i64, i64, f32); 4] = [(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

/// Dither `image` to `palette` with Floyd-Steinberg error diffusion.
///
/// Pixels are visited in raster order. Matching uses plain Euclidean
/// distance; targets outside the image are skipped, so the error that
/// would fall off the edge is simply dropped.
pub fn floyd_steinberg(image: &PixelBuffer, palette: &Palette) -> PixelBuffer {
    if palette.is_empty() {
        return image.clone();
    }
    let w = image.width() as i64;
    let h = image.height() as i64;
    let mut work: Vec<f32> = image.as_bytes().iter().map(|&v| v as f32).collect();
    let mut out = image.clone();

    for y in 0..h {
        for x in 0..w {
            let i = ((y * w + x) as usize) * CHANNELS;
            let value = [
                work[i].clamp(0.0, 255.0),
                work[i + 1].clamp(0.0, 255.0),
                work[i + 2].clamp(0.0, 255.0),
            ];
            let chosen = palette.colors()[palette.nearest_euclidean(value)];
            out.set_pixel(x as u32, y as u32, chosen);

            let error = [
                value[0] - chosen[0] as f32,
                value[1] - chosen[1] as f32,
                value[2] - chosen[2] as f32,
            ];
            for (dx, dy, weight) in KERNEL {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || nx >= w || ny >= h {
                    continue;
                }
                let j = ((ny * w + nx) as usize) * CHANNELS;
                for c in 0..CHANNELS {
                    work[j + c] += error[c] * weight / 16.0;
                }
            }
        }
    }
    out
}
