//! Bicubic interpolation with the Keys cubic kernel (`a = -0.5`).
//!
//! Each destination pixel is a 4x4 weighted sum of source pixels around the
//! pixel-center-aligned source coordinate. Taps falling outside the image
//! are clamped to the nearest edge pixel.

use std::ops::Range;

use crate::buffer::{to_channel, PixelBuffer, CHANNELS};

/// Kernel sharpness parameter (Catmull-Rom).
pub const CUBIC_A: f32 = -0.5;

/// Keys cubic convolution kernel.
#[inline]
pub fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        (CUBIC_A + 2.0) * t * t * t - (CUBIC_A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        CUBIC_A * t * t * t - 5.0 * CUBIC_A * t * t + 8.0 * CUBIC_A * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

/// Base index and the four tap weights for offsets -1..=2.
#[derive(Debug, Clone, Copy)]
struct Taps {
    base: i64,
    weights: [f32; 4],
}

fn taps(src_len: u32, dst_len: u32) -> Vec<Taps> {
    let ratio = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let pos = (d as f64 + 0.5) * ratio - 0.5;
            let base = pos.floor();
            let frac = (pos - base) as f32;
            let mut weights = [0.0; 4];
            for (i, w) in weights.iter_mut().enumerate() {
                *w = cubic_weight(frac - (i as f32 - 1.0));
            }
            Taps {
                base: base as i64,
                weights,
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
            let mut acc = [0.0f32; CHANNELS];
            for (j, wy) in ty.weights.iter().enumerate() {
                let sy = ty.base + j as i64 - 1;
                for (i, wx) in tx.weights.iter().enumerate() {
                    let w = wx * wy;
                    if w == 0.0 {
                        continue;
                    }
                    let p = src.pixel_clamped(tx.base + i as i64 - 1, sy);
                    for c in 0..CHANNELS {
                        acc[c] += p[c] as f32 * w;
                    }
                }
            }
            out.extend(acc.iter().map(|&v| to_channel(v)));
        }
    }
    out
}
