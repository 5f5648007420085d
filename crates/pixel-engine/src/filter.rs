//! Post-sharpen convolution.
//!
//! ```text
//!  0     -0.25   0
//! -0.25   2     -0.25
//!  0     -0.25   0
//! ```
//!
//! The kernel sums to 1, so flat regions pass through unchanged. Only
//! interior pixels are convolved; the one-pixel border is copied as is.

use crate::buffer::{to_channel, PixelBuffer, Rgb, CHANNELS};

/// Center weight of the sharpen kernel.
pub const SHARPEN_CENTER: f32 = 2.0;
/// Weight of each orthogonal neighbor.
pub const SHARPEN_NEIGHBOR: f32 = -0.25;

/// Apply the kernel at one pixel given its four orthogonal neighbors.
#[inline]
pub fn sharpen_pixel(center: Rgb, neighbors: &[Rgb; 4]) -> Rgb {
    let mut out = [0u8; CHANNELS];
    for c in 0..CHANNELS {
        let around: f32 = neighbors.iter().map(|n| n[c] as f32).sum();
        out[c] = to_channel(center[c] as f32 * SHARPEN_CENTER + around * SHARPEN_NEIGHBOR);
    }
    out
}

/// Sharpen every interior pixel of `src`.
///
/// All reads come from the unmodified input, so results do not depend on
/// traversal order.
pub fn sharpen(src: &PixelBuffer) -> PixelBuffer {
    let mut out = src.clone();
    let (w, h) = (src.width(), src.height());
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let neighbors = [
                src.pixel(x, y - 1),
                src.pixel(x - 1, y),
                src.pixel(x + 1, y),
                src.pixel(x, y + 1),
            ];
            out.set_pixel(x, y, sharpen_pixel(src.pixel(x, y), &neighbors));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_region_unchanged() {
        let src = PixelBuffer::solid(6, 6, [90, 120, 33]).unwrap();
        assert_eq!(sharpen(&src), src);
    }

    #[test]
    fn test_border_copied_from_input() {
        let src = PixelBuffer::from_fn(5, 4, |x, y| [(x * 50) as u8, (y * 60) as u8, 10]).unwrap();
        let out = sharpen(&src);
        for x in 0..5 {
            assert_eq!(out.pixel(x, 0), src.pixel(x, 0));
            assert_eq!(out.pixel(x, 3), src.pixel(x, 3));
        }
        for y in 0..4 {
            assert_eq!(out.pixel(0, y), src.pixel(0, y));
            assert_eq!(out.pixel(4, y), src.pixel(4, y));
        }
    }

    #[test]
    fn test_isolated_bright_pixel_is_amplified() {
        let mut src = PixelBuffer::solid(3, 3, [100; 3]).unwrap();
        src.set_pixel(1, 1, [140; 3]);
        let out = sharpen(&src);
        // 2 * 140 - 0.25 * 400 = 180
        assert_eq!(out.pixel(1, 1), [180; 3]);
    }

    #[test]
    fn test_clamps_to_byte_range() {
        let mut src = PixelBuffer::solid(3, 3, [0; 3]).unwrap();
        src.set_pixel(1, 1, [250; 3]);
        assert_eq!(sharpen(&src).pixel(1, 1), [255; 3]);
    }

    #[test]
    fn test_tiny_images_pass_through() {
        let src = PixelBuffer::from_fn(2, 5, |x, y| [(x + y) as u8; 3]).unwrap();
        assert_eq!(sharpen(&src), src);
    }
}
