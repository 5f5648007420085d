//! Recursively generated Bayer threshold matrices.
//!
//! ```text
//! B(1)  = [0]
//! B(2n) = | 4B(n)     4B(n)+2 |
//!         | 4B(n)+3   4B(n)+1 |
//! ```
//!
//! Normalizing by `n² - 1` yields thresholds in `[0, 1]`.

use std::sync::OnceLock;

use crate::error::EngineError;

/// Square ordered-dither threshold matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BayerMatrix {
    size: usize,
    indices: Vec<u32>,
    thresholds: Vec<f32>,
}

impl BayerMatrix {
    /// Generate the matrix of side `size`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BayerSize`] unless `size` is a power of two.
    pub fn generate(size: usize) -> Result<Self, EngineError> {
        if !size.is_power_of_two() {
            return Err(EngineError::BayerSize(size));
        }
        let indices = build(size);
        let denom = (size * size).saturating_sub(1).max(1) as f32;
        let thresholds = indices.iter().map(|&v| v as f32 / denom).collect();
        Ok(Self {
            size,
            indices,
            thresholds,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Integer rank at `(row, col)`, in `0..size²`.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> u32 {
        self.indices[(row % self.size) * self.size + col % self.size]
    }

    /// Normalized threshold at `(row, col)`, in `[0, 1]`. Coordinates wrap.
    #[inline]
    pub fn threshold(&self, row: usize, col: usize) -> f32 {
        self.thresholds[(row % self.size) * self.size + col % self.size]
    }

    /// Rows of integer ranks.
    pub fn index_rows(&self) -> Vec<Vec<u32>> {
        self.indices.chunks(self.size).map(<[u32]>::to_vec).collect()
    }

    /// Rows of normalized thresholds.
    pub fn threshold_rows(&self) -> Vec<Vec<f32>> {
        self.thresholds.chunks(self.size).map(<[f32]>::to_vec).collect()
    }
}

fn build(size: usize) -> Vec<u32> {
    if size == 1 {
        return vec![0];
    }
    let half = size / 2;
    let prev = build(half);
    let mut out = vec![0u32; size * size];
    for i in 0..half {
        for j in 0..half {
            let v = 4 * prev[i * half + j];
            out[i * size + j] = v;
            out[i * size + j + half] = v + 2;
            out[(i + half) * size + j] = v + 3;
            out[(i + half) * size + j + half] = v + 1;
        }
    }
    out
}

static BAYER_4: OnceLock<BayerMatrix> = OnceLock::new();
static BAYER_8: OnceLock<BayerMatrix> = OnceLock::new();

/// Precomputed 4x4 matrix.
pub fn bayer4() -> &'static BayerMatrix {
    BAYER_4.get_or_init(|| BayerMatrix {
        size: 4,
        indices: build(4),
        thresholds: build(4).iter().map(|&v| v as f32 / 15.0).collect(),
    })
}

/// Precomputed 8x8 matrix, used for production-quality dithering.
pub fn bayer8() -> &'static BayerMatrix {
    BAYER_8.get_or_init(|| BayerMatrix {
        size: 8,
        indices: build(8),
        thresholds: build(8).iter().map(|&v| v as f32 / 63.0).collect(),
    })
}
