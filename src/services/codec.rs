//! Image decode/encode boundary.
//!
//! The pipeline only sees [`PixelBuffer`]s; turning uploaded bytes into pixels
//! and results back into bytes goes through an [`ImageCodec`].

use pixel_engine::{PixelBuffer, CHANNELS};
use std::io::Cursor;

use crate::error::ProcessingError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Encoded image formats known to the codec layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
        }
    }

    /// Sniff the format from leading magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        bytes.starts_with(&PNG_SIGNATURE).then_some(ImageFormat::Png)
    }
}

/// A decoded upload
#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: PixelBuffer,
    pub format: ImageFormat,
}

/// Turns encoded bytes into RGB pixels and back.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ProcessingError>;

    fn encode(&self, image: &PixelBuffer, format: ImageFormat) -> Result<Vec<u8>, ProcessingError>;
}

/// PNG codec backed by the `png` crate, with optional oxipng re-compression
#[derive(Debug, Clone, Default)]
pub struct PngCodec {
    optimize: bool,
}

impl PngCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run oxipng over encoded output.
    pub fn optimized() -> Self {
        Self { optimize: true }
    }
}

impl ImageCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ProcessingError> {
        if ImageFormat::detect(bytes) != Some(ImageFormat::Png) {
            return Err(ProcessingError::Decode(
                "unsupported image format (expected PNG)".to_string(),
            ));
        }

        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;

        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;
        let data = &buf[..info.buffer_size()];

        let rgb = match info.color_type {
            png::ColorType::Rgb => data.to_vec(),
            png::ColorType::Rgba => data
                .chunks_exact(4)
                .flat_map(|px| over_white(&px[..3], px[3]))
                .collect(),
            png::ColorType::Grayscale => data.iter().flat_map(|&v| [v, v, v]).collect(),
            png::ColorType::GrayscaleAlpha => data
                .chunks_exact(2)
                .flat_map(|px| over_white(&[px[0], px[0], px[0]], px[1]))
                .collect(),
            png::ColorType::Indexed => {
                return Err(ProcessingError::Decode(
                    "indexed PNG was not expanded".to_string(),
                ))
            }
        };

        let pixels = PixelBuffer::from_raw(info.width, info.height, rgb)?;
        Ok(DecodedImage {
            pixels,
            format: ImageFormat::Png,
        })
    }

    fn encode(&self, image: &PixelBuffer, format: ImageFormat) -> Result<Vec<u8>, ProcessingError> {
        match format {
            ImageFormat::Png => self.encode_png(image),
        }
    }
}

impl PngCodec {
    fn encode_png(&self, image: &PixelBuffer) -> Result<Vec<u8>, ProcessingError> {
        let mut png_data = Vec::new();
        {
            let mut encoder =
                png::Encoder::new(Cursor::new(&mut png_data), image.width(), image.height());
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| ProcessingError::Encode(e.to_string()))?;
            writer
                .write_image_data(image.as_bytes())
                .map_err(|e| ProcessingError::Encode(e.to_string()))?;
            writer
                .finish()
                .map_err(|e| ProcessingError::Encode(e.to_string()))?;
        }

        if !self.optimize {
            return Ok(png_data);
        }

        let options = oxipng::Options {
            strip: oxipng::StripChunks::Safe,
            ..Default::default()
        };
        match oxipng::optimize_from_memory(&png_data, &options) {
            Ok(optimized) => {
                tracing::debug!(
                    before = png_data.len(),
                    after = optimized.len(),
                    "Optimized PNG"
                );
                Ok(optimized)
            }
            Err(e) => {
                tracing::warn!(%e, "PNG optimization failed, keeping unoptimized output");
                Ok(png_data)
            }
        }
    }
}

/// Composite a color with coverage `alpha` onto white.
fn over_white(rgb: &[u8], alpha: u8) -> [u8; CHANNELS] {
    let a = alpha as u16;
    let blend = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
    [blend(rgb[0]), blend(rgb[1]), blend(rgb[2])]
}
