//! Execution planning for conversion jobs.
//!
//! The optimizer decides, per job, whether stages run inline or on the worker
//! pool, how many rows each pooled chunk covers, and how many chunks may be
//! in flight. Plans degrade when leased memory nears the preset budget.

use pixel_engine::{bayer4, bayer8, BayerMatrix, CHANNELS};
use serde::Serialize;
use std::sync::Arc;

use super::buffer_pool::{BufferPool, MemoryMonitor};
use crate::models::{OptimizerConfig, Quality};

pub const LARGE_CHUNK_ROWS: u32 = 1024;
pub const MEDIUM_CHUNK_ROWS: u32 = 512;
pub const SMALL_CHUNK_ROWS: u32 = 256;

const MB: u64 = 1024 * 1024;

/// Resource allowance of a quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityPreset {
    pub chunking: bool,
    pub max_parallel: usize,
    pub memory_budget: u64,
    pub bayer_size: usize,
    pub sharpen: bool,
}

impl QualityPreset {
    pub fn for_quality(quality: Quality, pool_max: usize) -> Self {
        let pool_max = pool_max.max(1);
        match quality {
            Quality::Fast => Self {
                chunking: false,
                max_parallel: 1,
                memory_budget: 128 * MB,
                bayer_size: 4,
                sharpen: false,
            },
            Quality::Balanced => Self {
                chunking: true,
                max_parallel: pool_max,
                memory_budget: 256 * MB,
                bayer_size: 8,
                sharpen: false,
            },
            Quality::HighQuality => Self {
                chunking: true,
                max_parallel: pool_max,
                memory_budget: 512 * MB,
                bayer_size: 8,
                sharpen: true,
            },
        }
    }

    pub fn bayer(&self) -> &'static BayerMatrix {
        if self.bayer_size <= 4 {
            bayer4()
        } else {
            bayer8()
        }
    }
}

/// How a single job is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Run stages on the worker pool instead of one blocking task
    pub offload: bool,
    /// Split row-parallel stages into bands of `chunk_rows`
    pub chunking: bool,
    pub chunk_rows: u32,
    /// Pooled chunks in flight at once
    pub max_parallel_chunks: usize,
    /// Set when memory pressure shrank the plan
    pub degraded: bool,
}

pub struct PerformanceOptimizer {
    config: OptimizerConfig,
    pool_max: usize,
    buffers: Arc<BufferPool>,
    monitor: MemoryMonitor,
}

impl PerformanceOptimizer {
    pub fn new(config: OptimizerConfig, pool_max: usize, buffers: Arc<BufferPool>) -> Self {
        let monitor = MemoryMonitor::new(Arc::clone(&buffers));
        Self {
            config,
            pool_max,
            buffers,
            monitor,
        }
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    pub fn monitor(&self) -> &MemoryMonitor {
        &self.monitor
    }

    pub fn preset(&self, quality: Quality) -> QualityPreset {
        QualityPreset::for_quality(quality, self.pool_max)
    }

    /// Rows per chunk for an image of the given size.
    pub fn recommend_chunk_rows(&self, width: u32, height: u32) -> u32 {
        let bytes = rgb_bytes(width, height);
        let max = self.config.max_buffer_bytes;
        if bytes <= max / 4 {
            LARGE_CHUNK_ROWS
        } else if bytes <= max / 2 {
            MEDIUM_CHUNK_ROWS
        } else {
            SMALL_CHUNK_ROWS
        }
    }

    /// Whether an image is large enough to be worth the worker pool.
    pub fn should_offload(&self, width: u32, height: u32) -> bool {
        let pixels = width as u64 * height as u64;
        pixels > self.config.offload_pixel_threshold
            || rgb_bytes(width, height) > self.config.offload_byte_threshold
    }

    /// Shrink a plan to curb peak memory.
    pub fn degrade(&self, plan: ExecutionPlan) -> ExecutionPlan {
        ExecutionPlan {
            chunking: true,
            chunk_rows: (plan.chunk_rows / 2).max(self.config.min_chunk_rows.max(1)),
            max_parallel_chunks: 1,
            degraded: true,
            ..plan
        }
    }

    /// Plan the execution of a job whose largest frame is `width` x `height`.
    pub fn plan(&self, width: u32, height: u32, quality: Quality) -> ExecutionPlan {
        self.plan_with_footprint(width, height, quality, 0)
    }

    /// Like [`plan`](Self::plan), counting `footprint` bytes the job is about
    /// to lease on top of what is already leased.
    pub fn plan_with_footprint(
        &self,
        width: u32,
        height: u32,
        quality: Quality,
        footprint: u64,
    ) -> ExecutionPlan {
        let preset = self.preset(quality);
        let plan = ExecutionPlan {
            offload: self.should_offload(width, height),
            chunking: preset.chunking,
            chunk_rows: self.recommend_chunk_rows(width, height),
            max_parallel_chunks: preset.max_parallel,
            degraded: false,
        };

        let usage = self.monitor.projected_ratio(preset.memory_budget, footprint);
        if usage > self.config.memory_pressure_ratio {
            let degraded = self.degrade(plan);
            tracing::warn!(
                usage,
                budget = preset.memory_budget,
                chunk_rows = degraded.chunk_rows,
                "Memory pressure, degrading execution plan"
            );
            return degraded;
        }
        plan
    }
}

fn rgb_bytes(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * CHANNELS as u64
}
