use pixel_engine::{
    bayer4, bayer8, floyd_steinberg, generate_palette, ordered_dither_rows, resize_rows, sharpen,
    BayerMatrix, EngineError,
};

use super::task::{DitherMethod, TaskKind, TaskOutput};

pub type ExecResult = Result<TaskOutput, Box<dyn std::error::Error + Send + Sync>>;

/// Runs a task on a worker thread.
///
/// Implementations are called from plain OS threads and may block freely.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute(&self, kind: &TaskKind) -> ExecResult;
}

/// Executes tasks with pixel-engine
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineExecutor;

impl TaskExecutor for EngineExecutor {
    fn execute(&self, kind: &TaskKind) -> ExecResult {
        let output = match kind {
            TaskKind::Resize {
                source,
                width,
                height,
                rows,
                interpolation,
            } => TaskOutput::Pixels(resize_rows(
                source,
                *width,
                *height,
                rows.clone(),
                *interpolation,
            )?),
            TaskKind::Quantize { image, max_colors } => {
                TaskOutput::Palette(generate_palette(image, *max_colors))
            }
            TaskKind::Dither {
                image,
                rows,
                palette,
                method,
            } => match method {
                DitherMethod::Ordered { bayer_size, ratio } => {
                    if rows.start > rows.end || rows.end > image.height() {
                        return Err(EngineError::RowRange {
                            start: rows.start,
                            end: rows.end,
                            height: image.height(),
                        }
                        .into());
                    }
                    let generated;
                    let matrix = match bayer_size {
                        4 => bayer4(),
                        8 => bayer8(),
                        n => {
                            generated = BayerMatrix::generate(*n)?;
                            &generated
                        }
                    };
                    TaskOutput::Pixels(ordered_dither_rows(
                        image.rows(rows.start, rows.end),
                        image.width(),
                        rows.start,
                        palette,
                        matrix,
                        *ratio,
                    ))
                }
                DitherMethod::FloydSteinberg => {
                    TaskOutput::Pixels(floyd_steinberg(image, palette).into_raw())
                }
            },
            TaskKind::PixelArt { image } => TaskOutput::Pixels(sharpen(image).into_raw()),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixel_engine::{DitherRatio, Interpolation, Palette, PixelBuffer};
    use std::sync::Arc;

    fn gradient() -> Arc<PixelBuffer> {
        Arc::new(PixelBuffer::from_fn(8, 8, |x, y| [(x * 32) as u8, (y * 32) as u8, 64]).unwrap())
    }

    #[test]
    fn test_resize_rows() {
        let out = EngineExecutor
            .execute(&TaskKind::Resize {
                source: gradient(),
                width: 4,
                height: 4,
                rows: 1..3,
                interpolation: Interpolation::Nearest,
            })
            .unwrap();

        assert_eq!(out.into_pixels().unwrap().len(), 2 * 4 * 3);
    }

    #[test]
    fn test_quantize() {
        let out = EngineExecutor
            .execute(&TaskKind::Quantize {
                image: gradient(),
                max_colors: 4,
            })
            .unwrap();

        assert_eq!(out.into_palette().unwrap().len(), 4);
    }

    #[test]
    fn test_ordered_dither_band_uses_palette_colors() {
        let palette = Arc::new(Palette::from_colors(&[[0, 0, 0], [255, 255, 255]], 2).unwrap());
        let out = EngineExecutor
            .execute(&TaskKind::Dither {
                image: gradient(),
                rows: 2..4,
                palette: Arc::clone(&palette),
                method: DitherMethod::Ordered {
                    bayer_size: 4,
                    ratio: DitherRatio::default(),
                },
            })
            .unwrap()
            .into_pixels()
            .unwrap();

        assert_eq!(out.len(), 2 * 8 * 3);
        assert!(out
            .chunks_exact(3)
            .all(|px| px == [0, 0, 0] || px == [255, 255, 255]));
    }

    #[test]
    fn test_dither_rejects_bad_rows() {
        let palette = Arc::new(Palette::from_colors(&[[0, 0, 0]], 1).unwrap());
        let err = EngineExecutor
            .execute(&TaskKind::Dither {
                image: gradient(),
                rows: 4..20,
                palette,
                method: DitherMethod::Ordered {
                    bayer_size: 8,
                    ratio: DitherRatio::default(),
                },
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "row range 4..20 out of bounds for height 8");
    }

    #[test]
    fn test_dither_rejects_bad_bayer_size() {
        let palette = Arc::new(Palette::from_colors(&[[0, 0, 0]], 1).unwrap());
        let err = EngineExecutor
            .execute(&TaskKind::Dither {
                image: gradient(),
                rows: 0..8,
                palette,
                method: DitherMethod::Ordered {
                    bayer_size: 6,
                    ratio: DitherRatio::default(),
                },
            })
            .unwrap_err();

        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn test_pixel_art_sharpens_whole_image() {
        let image = gradient();
        let out = EngineExecutor
            .execute(&TaskKind::PixelArt {
                image: Arc::clone(&image),
            })
            .unwrap();

        assert_eq!(out, TaskOutput::Pixels(sharpen(&image).into_raw()));
    }
}
