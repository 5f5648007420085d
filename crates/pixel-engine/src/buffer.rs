//! Packed RGB pixel buffer.
//!
//! All engine stages operate on tightly packed, row-major, 3-channel 8-bit
//! pixels. [`PixelBuffer`] owns such a buffer together with its dimensions
//! and guarantees `data.len() == width * height * 3`.

use crate::error::EngineError;

/// An RGB color as raw bytes.
pub type Rgb = [u8; 3];

/// Bytes per pixel of every buffer handled by the engine.
pub const CHANNELS: usize = 3;

/// Owned RGB image with validated dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGB bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDimensions`] for a zero width or height
    /// and [`EngineError::BufferSize`] when `data` is not `width * height * 3`
    /// bytes long.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EngineError> {
        let expected = byte_len(width, height)?;
        if data.len() != expected {
            return Err(EngineError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap bytes whose length is already known to match the dimensions.
    pub(crate) fn from_raw_unchecked(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * CHANNELS);
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a buffer filled with a single color.
    pub fn solid(width: u32, height: u32, color: Rgb) -> Result<Self, EngineError> {
        let len = byte_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..(len / CHANNELS) {
            data.extend_from_slice(&color);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self, EngineError>
    where
        F: FnMut(u32, u32) -> Rgb,
    {
        let len = byte_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Read the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the buffer.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Read the pixel nearest to `(x, y)`, clamping both coordinates into
    /// the buffer.
    #[inline]
    pub fn pixel_clamped(&self, x: i64, y: i64) -> Rgb {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixel(cx, cy)
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        let i = self.offset(x, y);
        self.data[i..i + CHANNELS].copy_from_slice(&color);
    }

    /// Raw bytes of rows `start..end`.
    pub fn rows(&self, start: u32, end: u32) -> &[u8] {
        let stride = self.stride();
        &self.data[start as usize * stride..end as usize * stride]
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }
}

/// Byte length of a `width` x `height` RGB buffer.
pub fn byte_len(width: u32, height: u32) -> Result<usize, EngineError> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidDimensions { width, height });
    }
    Ok(width as usize * height as usize * CHANNELS)
}

/// Round and clamp a floating-point channel value to a byte.
#[inline]
pub(crate) fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
