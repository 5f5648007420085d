//! Resize engine.
//!
//! Four interpolators are available through [`Interpolation`]:
//!
//! - **Nearest**: point sampling, identity when dimensions match
//! - **Bilinear**: 2x2 blend using the `(W0 - 1) / W1` source ratio
//! - **Bicubic**: 4x4 Catmull-Rom style convolution (`a = -0.5`)
//! - **PixelArt**: nearest neighbor plus an edge-only sharpening pass
//!
//! Every interpolator can render an arbitrary band of destination rows via
//! [`resize_rows`]. Rendering all bands and concatenating them is
//! byte-identical to [`resize`], which is what lets the worker pool split a
//! large resize into independent chunks.

mod bicubic;
mod bilinear;
mod nearest;
mod pixel_art;

use std::ops::Range;

use crate::buffer::{byte_len, PixelBuffer};
use crate::error::EngineError;

pub use pixel_art::EDGE_THRESHOLD;

/// Interpolation method used when scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
    Bicubic,
    PixelArt,
}

/// Resize `src` to `dst_width` x `dst_height`.
pub fn resize(
    src: &PixelBuffer,
    dst_width: u32,
    dst_height: u32,
    interpolation: Interpolation,
) -> Result<PixelBuffer, EngineError> {
    let data = resize_rows(src, dst_width, dst_height, 0..dst_height, interpolation)?;
    PixelBuffer::from_raw(dst_width, dst_height, data)
}

/// Render destination rows `rows` of a `dst_width` x `dst_height` resize.
///
/// Returns `rows.len() * dst_width * 3` bytes.
pub fn resize_rows(
    src: &PixelBuffer,
    dst_width: u32,
    dst_height: u32,
    rows: Range<u32>,
    interpolation: Interpolation,
) -> Result<Vec<u8>, EngineError> {
    byte_len(dst_width, dst_height)?;
    if rows.start > rows.end || rows.end > dst_height {
        return Err(EngineError::RowRange {
            start: rows.start,
            end: rows.end,
            height: dst_height,
        });
    }

    let out = match interpolation {
        Interpolation::Nearest => nearest::render(src, dst_width, dst_height, rows),
        Interpolation::Bilinear => bilinear::render(src, dst_width, dst_height, rows),
        Interpolation::Bicubic => bicubic::render(src, dst_width, dst_height, rows),
        Interpolation::PixelArt => pixel_art::render(src, dst_width, dst_height, rows),
    };
    Ok(out)
}

/// Scale `width` x `height` by `factor_percent`, rounding and never going
/// below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, factor_percent: u32) -> (u32, u32) {
    let scale = |v: u32| ((v as u64 * factor_percent as u64 + 50) / 100).max(1) as u32;
    (scale(width), scale(height))
}

/// Split `0..height` into consecutive bands of at most `chunk_rows` rows.
pub fn row_chunks(height: u32, chunk_rows: u32) -> Vec<Range<u32>> {
    let step = chunk_rows.max(1);
    (0..height)
        .step_by(step as usize)
        .map(|start| start..(start + step).min(height))
        .collect()
}
