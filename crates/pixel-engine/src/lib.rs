#![allow(clippy::module_inception, clippy::needless_range_loop)]

//! pixel-engine: resize, palette quantization and dithering for pixel art
//!
//! Every function in this crate is pure and synchronous. Images are
//! [`PixelBuffer`]s: packed, row-major, 8-bit RGB.
//!
//! # Quick Start
//!
//! ```
//! use pixel_engine::{
//!     bayer8, generate_palette, ordered_dither, resize, DitherRatio, Interpolation,
//!     PixelBuffer,
//! };
//!
//! let image = PixelBuffer::from_fn(64, 64, |x, y| [(x * 4) as u8, (y * 4) as u8, 128]).unwrap();
//! let small = resize(&image, 32, 32, Interpolation::Nearest).unwrap();
//! let palette = generate_palette(&small, 16);
//! let dithered = ordered_dither(&small, &palette, bayer8(), DitherRatio::new(1.0));
//!
//! assert_eq!(dithered.width(), 32);
//! assert!(palette.len() <= 16);
//! ```
//!
//! # Pipeline Stages
//!
//! | Stage | Entry point | Chunkable by rows |
//! |-------|-------------|-------------------|
//! | Resize | [`resize`] / [`resize_rows`] | yes |
//! | Palette | [`generate_palette`] | no (needs global counts) |
//! | Ordered dither | [`ordered_dither`] / [`ordered_dither_rows`] | yes |
//! | Error diffusion | [`floyd_steinberg`] | no (sequential) |
//! | Sharpen | [`sharpen`] | no |
//!
//! Row-chunkable stages produce byte-identical output whether they run on
//! the whole image or on bands that are stitched back together.

pub mod buffer;
pub mod dither;
pub mod error;
pub mod filter;
pub mod palette;
pub mod resize;

pub use buffer::{PixelBuffer, Rgb, CHANNELS};
pub use dither::{
    bayer4, bayer8, floyd_steinberg, ordered_dither, ordered_dither_rows, BayerMatrix,
    DitherRatio,
};
pub use error::EngineError;
pub use filter::sharpen;
pub use palette::{generate_palette, Palette, DEFAULT_MAX_COLORS};
pub use resize::{resize, resize_rows, row_chunks, scaled_dimensions, Interpolation};
