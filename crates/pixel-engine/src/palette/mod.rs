//! Palette types and frequency-based palette generation.

mod generate;
mod palette;

pub use generate::{generate_palette, quantize_channel, DEFAULT_MAX_COLORS, QUANT_STEP};
pub use palette::{hex, Palette, MAX_PALETTE_SIZE};
