//! Error type for the pixel-engine public API.

use thiserror::Error;

/// Errors raised by the resize, palette and dither primitives.
///
/// The engine is pure: every error describes a malformed input, never an
/// I/O or resource failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Width or height is zero.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Raw buffer length does not match `width * height * 3`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Requested row range lies outside the destination image.
    #[error("row range {start}..{end} out of bounds for height {height}")]
    RowRange { start: u32, end: u32, height: u32 },

    /// Bayer matrices only exist for power-of-two sizes.
    #[error("bayer matrix size must be a power of two, got {0}")]
    BayerSize(usize),

    /// A palette needs at least one color.
    #[error("palette cannot be empty")]
    EmptyPalette,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EngineError::InvalidDimensions {
                width: 0,
                height: 10
            }
            .to_string(),
            "invalid dimensions: 0x10"
        );
        assert_eq!(
            EngineError::BufferSize {
                expected: 12,
                actual: 9
            }
            .to_string(),
            "buffer size mismatch: expected 12 bytes, got 9"
        );
        assert_eq!(
            EngineError::BayerSize(6).to_string(),
            "bayer matrix size must be a power of two, got 6"
        );
        assert_eq!(EngineError::EmptyPalette.to_string(), "palette cannot be empty");
    }
}
