//! Nearest-neighbor sampling.

use std::ops::Range;

use crate::buffer::{PixelBuffer, CHANNELS};

/// Source coordinate for destination index `d` when scaling `src_len` to
/// `dst_len`: `floor(d * src_len / dst_len)`, clamped to the source.
#[inline]
pub(super) fn source_index(d: u32, src_len: u32, dst_len: u32) -> u32 {
    let s = (d as u64 * src_len as u64 / dst_len as u64) as u32;
    s.min(src_len - 1)
}

pub(super) fn render(src: &PixelBuffer, dst_w: u32, dst_h: u32, rows: Range<u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * dst_w as usize * CHANNELS);
    let xs: Vec<u32> = (0..dst_w)
        .map(|x| source_index(x, src.width(), dst_w))
        .collect();

    for y in rows {
        let sy = source_index(y, src.height(), dst_h);
        for &sx in &xs {
            out.extend_from_slice(&src.pixel(sx, sy));
        }
    }
    out
}
