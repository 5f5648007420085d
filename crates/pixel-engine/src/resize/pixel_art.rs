//! Pixel-art resize: nearest neighbor followed by an edge-only boost.
//!
//! After point sampling, a pixel whose largest channel difference against
//! any of its four orthogonal neighbors exceeds [`EDGE_THRESHOLD`] is run
//! through the post-sharpen kernel. Flat areas keep their nearest-neighbor
//! color untouched, so mosaic blocks stay solid while their borders crisp up.

use std::ops::Range;

use super::nearest;
use crate::buffer::{PixelBuffer, Rgb, CHANNELS};
use crate::filter::sharpen_pixel;

/// Channel difference above which a pixel counts as an edge.
pub const EDGE_THRESHOLD: u8 = 30;

pub(super) fn render(src: &PixelBuffer, dst_w: u32, dst_h: u32, rows: Range<u32>) -> Vec<u8> {
    if rows.is_empty() {
        return Vec::new();
    }

    // One guard row on each side so band seams see the same neighbors as a
    // full render.
    let guard_start = rows.start.saturating_sub(1);
    let guard_end = (rows.end + 1).min(dst_h);
    let band_data = nearest::render(src, dst_w, dst_h, guard_start..guard_end);
    let band = Band {
        data: &band_data,
        width: dst_w,
        first_row: guard_start,
    };

    let mut out = Vec::with_capacity(rows.len() * dst_w as usize * CHANNELS);
    for y in rows {
        for x in 0..dst_w {
            let center = band.pixel(x, y);
            let interior = x > 0 && y > 0 && x + 1 < dst_w && y + 1 < dst_h;
            if !interior {
                out.extend_from_slice(&center);
                continue;
            }
            let neighbors = [
                band.pixel(x, y - 1),
                band.pixel(x - 1, y),
                band.pixel(x + 1, y),
                band.pixel(x, y + 1),
            ];
            if is_edge(center, &neighbors) {
                out.extend_from_slice(&sharpen_pixel(center, &neighbors));
            } else {
                out.extend_from_slice(&center);
            }
        }
    }
    out
}

/// Whether any neighbor differs from `center` by more than the threshold in
/// some channel.
pub fn is_edge(center: Rgb, neighbors: &[Rgb]) -> bool {
    neighbors.iter().any(|n| max_channel_diff(center, *n) > EDGE_THRESHOLD)
}

#[inline]
fn max_channel_diff(a: Rgb, b: Rgb) -> u8 {
    (0..CHANNELS).map(|c| a[c].abs_diff(b[c])).max().unwrap_or(0)
}

/// Rows `first_row..` of a destination image held in memory.
struct Band<'a> {
    data: &'a [u8],
    width: u32,
    first_row: u32,
}

impl Band<'_> {
    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = ((y - self.first_row) as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}
