pub mod buffer_pool;
pub mod codec;
pub mod image_store;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod task_manager;
pub mod worker_pool;

pub use buffer_pool::{BufferPool, MemoryLease, MemoryMonitor};
pub use codec::{DecodedImage, ImageCodec, ImageFormat, PngCodec};
pub use image_store::{ImageStore, InMemoryImageStore};
pub use optimizer::{ExecutionPlan, PerformanceOptimizer, QualityPreset};
pub use pipeline::{ConversionPipeline, NoProgress, ProgressSink};
pub use progress::{JobEvent, JobEventKind, JobSubscription, ProgressBus};
pub use task_manager::{estimate_duration, CleanupReport, TaskManager, TaskStats};
pub use worker_pool::{
    EngineExecutor, PendingTask, PoolSettings, PoolStatus, TaskExecutor, TaskId, TaskKind,
    TaskOutput, TaskPriority, WorkerPool, WorkerTask,
};
