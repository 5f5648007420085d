//! Ordered (Bayer) dithering.

use super::bayer::BayerMatrix;
use super::DitherRatio;
use crate::buffer::{PixelBuffer, CHANNELS};
use crate::palette::Palette;

/// Perturbation amplitude at ratio 1.0, one palette quantization bucket.
pub const ORDERED_SCALE: f32 = 32.0;

/// Dither a whole image against `palette`.
pub fn ordered_dither(
    image: &PixelBuffer,
    palette: &Palette,
    matrix: &BayerMatrix,
    ratio: DitherRatio,
) -> PixelBuffer {
    let data = ordered_dither_rows(image.as_bytes(), image.width(), 0, palette, matrix, ratio);
    // one output pixel per input pixel
    PixelBuffer::from_raw_unchecked(image.width(), image.height(), data)
}

/// Dither a band of packed RGB rows whose first row is image row
/// `first_row`.
///
/// Thresholds are looked up at absolute image coordinates, so dithering
/// bands independently and concatenating them equals [`ordered_dither`].
pub fn ordered_dither_rows(
    rows: &[u8],
    width: u32,
    first_row: u32,
    palette: &Palette,
    matrix: &BayerMatrix,
    ratio: DitherRatio,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len());
    let stride = width as usize * CHANNELS;
    if stride == 0 || palette.is_empty() {
        return rows.to_vec();
    }
    let amplitude = ORDERED_SCALE * ratio.value();

    for (dy, row) in rows.chunks_exact(stride).enumerate() {
        let y = first_row as usize + dy;
        for (x, px) in row.chunks_exact(CHANNELS).enumerate() {
            let offset = (matrix.threshold(y, x) - 0.5) * amplitude;
            let perturbed = [
                (px[0] as f32 + offset).clamp(0.0, 255.0),
                (px[1] as f32 + offset).clamp(0.0, 255.0),
                (px[2] as f32 + offset).clamp(0.0, 255.0),
            ];
            let idx = palette.nearest_weighted(perturbed);
            out.extend_from_slice(&palette.colors()[idx]);
        }
    }
    out
}
