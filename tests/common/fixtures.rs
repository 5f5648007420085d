//! Test images.

use pixel_engine::{PixelBuffer, Rgb};
use pixelize::services::{ImageCodec, ImageFormat, PngCodec};

pub const RED: Rgb = [255, 0, 0];

/// Uniform image of `color`
pub fn solid(width: u32, height: u32, color: Rgb) -> PixelBuffer {
    PixelBuffer::solid(width, height, color).unwrap()
}

/// Red rises left to right, green top to bottom, blue along the diagonal
pub fn gradient(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        [
            (x * 255 / width.max(2).saturating_sub(1)).min(255) as u8,
            (y * 255 / height.max(2).saturating_sub(1)).min(255) as u8,
            ((x + y) * 255 / (width + height)) as u8,
        ]
    })
    .unwrap()
}

/// PNG encoding of `image`, as an uploader would send it
pub fn png_bytes(image: &PixelBuffer) -> Vec<u8> {
    PngCodec::new().encode(image, ImageFormat::Png).unwrap()
}
