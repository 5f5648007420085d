//! End-to-end conversion of one image.
//!
//! Stages run in order: resize, optional post-sharpen, palette generation,
//! optional dithering. Each stage runs either inline on the blocking pool or
//! as worker pool tasks, as the [`ExecutionPlan`] says. Row-parallel stages
//! (resize, ordered dither) are split into bands when the plan chunks.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use pixel_engine::{
    floyd_steinberg, generate_palette, ordered_dither, resize, row_chunks, sharpen, Interpolation,
    Palette, PixelBuffer, CHANNELS,
};
use std::ops::Range;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use super::optimizer::{ExecutionPlan, PerformanceOptimizer, QualityPreset};
use super::worker_pool::{DitherMethod, TaskKind, TaskOutput, TaskPriority, WorkerPool, WorkerTask};
use crate::error::ProcessingError;
use crate::models::{ColorMode, ConversionParams, ConversionResult, ExecutionMode};

/// Receives progress updates while a conversion runs
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: u8, step: &str);
}

/// Discards progress
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _progress: u8, _step: &str) {}
}

pub struct ConversionPipeline {
    pool: WorkerPool,
    optimizer: Arc<PerformanceOptimizer>,
}

impl ConversionPipeline {
    pub fn new(pool: WorkerPool, optimizer: Arc<PerformanceOptimizer>) -> Self {
        Self { pool, optimizer }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn optimizer(&self) -> &Arc<PerformanceOptimizer> {
        &self.optimizer
    }

    /// Convert `source` according to `params`.
    pub async fn run(
        &self,
        source: Arc<PixelBuffer>,
        params: &ConversionParams,
        progress: &dyn ProgressSink,
    ) -> Result<ConversionResult, ProcessingError> {
        let params = params.normalized();
        let (width, height) = params.target_dimensions(source.width(), source.height());
        let (plan_w, plan_h) = if source.pixel_count() as u64 >= width as u64 * height as u64 {
            (source.width(), source.height())
        } else {
            (width, height)
        };
        let plan = self.optimizer.plan_with_footprint(
            plan_w,
            plan_h,
            params.quality,
            job_footprint(&source, width, height),
        );
        self.run_with_plan(source, &params, plan, progress).await
    }

    /// Convert `source` following an explicit execution plan.
    pub async fn run_with_plan(
        &self,
        source: Arc<PixelBuffer>,
        params: &ConversionParams,
        plan: ExecutionPlan,
        progress: &dyn ProgressSink,
    ) -> Result<ConversionResult, ProcessingError> {
        let started = Instant::now();
        let params = params.normalized();
        let (width, height) = params.target_dimensions(source.width(), source.height());
        let preset = self.optimizer.preset(params.quality);
        let buffers = Arc::clone(self.optimizer.buffers());

        let _lease = buffers.lease(job_footprint(&source, width, height));

        let mode = if plan.offload {
            ExecutionMode::Pooled
        } else {
            ExecutionMode::Inline
        };
        tracing::debug!(
            src_width = source.width(),
            src_height = source.height(),
            width,
            height,
            ?mode,
            chunking = plan.chunking,
            chunk_rows = plan.chunk_rows,
            degraded = plan.degraded,
            "Planned conversion"
        );
        progress.report(10, "Planning").await;

        let (resized, chunks) = self
            .resize_stage(&source, width, height, params.interpolation.into(), &plan, progress)
            .await?;
        progress.report(50, "Resizing").await;

        let resized = if preset.sharpen {
            progress.report(55, "Sharpening").await;
            let sharpened = self.sharpen_stage(&resized, &plan).await?;
            buffers.recycle_pixels(resized);
            sharpened
        } else {
            resized
        };

        progress.report(60, "Generating palette").await;
        let palette = self
            .palette_stage(&resized, params.max_colors, &plan)
            .await?;

        let output = match params.color_mode {
            ColorMode::None => resized,
            color_mode => {
                progress.report(65, "Dithering").await;
                let dithered = self
                    .dither_stage(&resized, &palette, color_mode, &params, &preset, &plan, progress)
                    .await?;
                buffers.recycle_pixels(resized);
                dithered
            }
        };
        progress.report(95, "Finalizing").await;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            width,
            height,
            colors = palette.len(),
            ?mode,
            chunks,
            processing_time_ms,
            "Conversion finished"
        );

        Ok(ConversionResult {
            width: output.width(),
            height: output.height(),
            pixels: output,
            palette: palette.to_hex(),
            processing_time_ms,
            execution_mode: mode,
            chunks,
        })
    }

    async fn resize_stage(
        &self,
        source: &Arc<PixelBuffer>,
        width: u32,
        height: u32,
        interpolation: Interpolation,
        plan: &ExecutionPlan,
        progress: &dyn ProgressSink,
    ) -> Result<(Arc<PixelBuffer>, usize), ProcessingError> {
        if !plan.offload {
            let source = Arc::clone(source);
            let resized = tokio::task::spawn_blocking(move || {
                resize(&source, width, height, interpolation)
            })
            .await??;
            return Ok((Arc::new(resized), 1));
        }

        let bands = bands(height, plan);
        let count = bands.len();
        let tasks = bands
            .into_iter()
            .map(|rows| {
                WorkerTask::new(TaskKind::Resize {
                    source: Arc::clone(source),
                    width,
                    height,
                    rows,
                    interpolation,
                })
                .with_priority(TaskPriority::High)
            })
            .collect();
        let data = self
            .run_chunks(
                tasks,
                plan.max_parallel_chunks,
                rgb_bytes(width, height) as usize,
                progress,
                (15, 50),
                "Resizing",
            )
            .await?;
        Ok((Arc::new(PixelBuffer::from_raw(width, height, data)?), count))
    }

    async fn sharpen_stage(
        &self,
        image: &Arc<PixelBuffer>,
        plan: &ExecutionPlan,
    ) -> Result<Arc<PixelBuffer>, ProcessingError> {
        let sharpened = if plan.offload {
            let output = self
                .pool
                .execute_task(WorkerTask::new(TaskKind::PixelArt {
                    image: Arc::clone(image),
                }))
                .await?;
            PixelBuffer::from_raw(image.width(), image.height(), expect_pixels(output)?)?
        } else {
            let image = Arc::clone(image);
            tokio::task::spawn_blocking(move || sharpen(&image)).await?
        };
        Ok(Arc::new(sharpened))
    }

    async fn palette_stage(
        &self,
        image: &Arc<PixelBuffer>,
        max_colors: usize,
        plan: &ExecutionPlan,
    ) -> Result<Arc<Palette>, ProcessingError> {
        let palette = if plan.offload {
            let output = self
                .pool
                .execute_task(WorkerTask::new(TaskKind::Quantize {
                    image: Arc::clone(image),
                    max_colors,
                }))
                .await?;
            output
                .into_palette()
                .ok_or(ProcessingError::UnexpectedOutput("palette"))?
        } else {
            let image = Arc::clone(image);
            tokio::task::spawn_blocking(move || generate_palette(&image, max_colors)).await?
        };
        Ok(Arc::new(palette))
    }

    #[allow(clippy::too_many_arguments)]
    async fn dither_stage(
        &self,
        image: &Arc<PixelBuffer>,
        palette: &Arc<Palette>,
        mode: ColorMode,
        params: &ConversionParams,
        preset: &QualityPreset,
        plan: &ExecutionPlan,
        progress: &dyn ProgressSink,
    ) -> Result<Arc<PixelBuffer>, ProcessingError> {
        let ratio = params.dither_ratio();
        let (width, height) = (image.width(), image.height());

        if !plan.offload {
            let image = Arc::clone(image);
            let palette = Arc::clone(palette);
            let matrix = preset.bayer();
            let dithered = tokio::task::spawn_blocking(move || match mode {
                ColorMode::FloydSteinberg => floyd_steinberg(&image, &palette),
                _ => ordered_dither(&image, &palette, matrix, ratio),
            })
            .await?;
            progress.report(90, "Dithering").await;
            return Ok(Arc::new(dithered));
        }

        let (band_list, method) = match mode {
            ColorMode::FloydSteinberg => (vec![0..height], DitherMethod::FloydSteinberg),
            _ => (
                bands(height, plan),
                DitherMethod::Ordered {
                    bayer_size: preset.bayer_size,
                    ratio,
                },
            ),
        };
        let tasks = band_list
            .into_iter()
            .map(|rows| {
                WorkerTask::new(TaskKind::Dither {
                    image: Arc::clone(image),
                    rows,
                    palette: Arc::clone(palette),
                    method,
                })
                .with_priority(TaskPriority::High)
            })
            .collect();
        let data = self
            .run_chunks(
                tasks,
                plan.max_parallel_chunks,
                rgb_bytes(width, height) as usize,
                progress,
                (65, 90),
                "Dithering",
            )
            .await?;
        Ok(Arc::new(PixelBuffer::from_raw(width, height, data)?))
    }

    /// Run pixel tasks with bounded parallelism and stitch their output in
    /// submission order.
    async fn run_chunks(
        &self,
        tasks: Vec<WorkerTask>,
        max_parallel: usize,
        capacity: usize,
        progress: &dyn ProgressSink,
        (from, to): (u8, u8),
        step: &str,
    ) -> Result<Vec<u8>, ProcessingError> {
        let buffers = self.optimizer.buffers();
        let total = tasks.len();
        let mut results = pin!(stream::iter(
            tasks.into_iter().map(|task| self.pool.execute_task(task))
        )
        .buffered(max_parallel.max(1)));

        let mut data = buffers.take(capacity);
        let mut done = 0;
        while let Some(output) = results.next().await {
            let chunk = expect_pixels(output?)?;
            data.extend_from_slice(&chunk);
            buffers.recycle(chunk);
            done += 1;
            progress.report(span_progress(from, to, done, total), step).await;
        }
        Ok(data)
    }
}

/// Row bands for a chunkable stage.
fn bands(height: u32, plan: &ExecutionPlan) -> Vec<Range<u32>> {
    if plan.chunking {
        row_chunks(height, plan.chunk_rows)
    } else {
        vec![0..height]
    }
}

fn expect_pixels(output: TaskOutput) -> Result<Vec<u8>, ProcessingError> {
    output
        .into_pixels()
        .ok_or(ProcessingError::UnexpectedOutput("pixels"))
}

fn span_progress(from: u8, to: u8, done: usize, total: usize) -> u8 {
    let span = to.saturating_sub(from) as usize;
    from + (span * done / total.max(1)).min(span) as u8
}

fn rgb_bytes(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * CHANNELS as u64
}

/// Bytes a job holds at peak: the source, the resized frame and the output.
fn job_footprint(source: &PixelBuffer, width: u32, height: u32) -> u64 {
    rgb_bytes(source.width(), source.height()) + 2 * rgb_bytes(width, height)
}
