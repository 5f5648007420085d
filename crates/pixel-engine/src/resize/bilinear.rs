//! Bilinear interpolation.
//!
//! Source coordinates use the `(W0 - 1) / W1` ratio, so destination `0`
//! always lands on source `0` and whole-number source coordinates reproduce
//! the source pixel exactly (their fractional weight is zero).

use std::ops::Range;

use crate::buffer::{to_channel, PixelBuffer, CHANNELS};

/// Floor index, ceil index (clamped) and fractional weight for one axis.
#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: u32,
    hi: u32,
    frac: f32,
}

fn taps(src_len: u32, dst_len: u32) -> Vec<Tap> {
    let ratio = (src_len - 1) as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let pos = d as f64 * ratio;
            let lo = pos.floor();
            Tap {
                lo: lo as u32,
                hi: (pos.ceil() as u32).min(src_len - 1),
                frac: (pos - lo) as f32,
            }
        })
        .collect()
}

pub(super) fn render(src: &PixelBuffer, dst_w: u32, dst_h: u32, rows: Range<u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * dst_w as usize * CHANNELS);
    let xt = taps(src.width(), dst_w);
    let yt = taps(src.height(), dst_h);

    for y in rows {
        let ty = yt[y as usize];
        for tx in &xt {
            let tl = src.pixel(tx.lo, ty.lo);
            let tr = src.pixel(tx.hi, ty.lo);
            let bl = src.pixel(tx.lo, ty.hi);
            let br = src.pixel(tx.hi, ty.hi);
            for c in 0..CHANNELS {
                let top = tl[c] as f32 * (1.0 - tx.frac) + tr[c] as f32 * tx.frac;
                let bottom = bl[c] as f32 * (1.0 - tx.frac) + br[c] as f32 * tx.frac;
                out.push(to_channel(top * (1.0 - ty.frac) + bottom * ty.frac));
            }
        }
    }
    out
}
