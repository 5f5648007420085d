//! Test context factory for integration tests.

use pixel_engine::PixelBuffer;
use std::sync::{Arc, Condvar, Mutex};

use pixelize::models::{AppConfig, ConversionParams, Job, JobId, PoolConfig};
use pixelize::services::{
    BufferPool, ConversionPipeline, EngineExecutor, InMemoryImageStore, JobEvent,
    PerformanceOptimizer, PngCodec, PoolSettings, TaskExecutor, TaskKind, TaskManager, WorkerPool,
};
use pixelize::services::worker_pool::ExecResult;

/// Task manager wired like production, with knobs for tests
pub struct TestContext {
    pub manager: Arc<TaskManager>,
}

impl TestContext {
    /// Default configuration with a two-worker pool
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder {
            config: AppConfig {
                pool: PoolConfig {
                    max_workers: Some(2),
                    min_workers: Some(1),
                    ..Default::default()
                },
                ..Default::default()
            },
            executor: None,
        }
    }

    /// Store `image` and queue a conversion of it
    pub async fn submit(&self, image: PixelBuffer, params: ConversionParams) -> JobId {
        let image_id = self
            .manager
            .store_decoded_image(image, "image/png")
            .await;
        self.manager.create_task(&image_id, params).await.unwrap()
    }

    /// Submit, admit and wait for a single job, collecting its events
    pub async fn convert(
        &self,
        image: PixelBuffer,
        params: ConversionParams,
    ) -> (Job, Vec<JobEvent>) {
        let id = self.submit(image, params).await;
        let mut subscription = self.manager.subscribe(&id);
        assert_eq!(self.manager.tick().await, Some(id.clone()));

        let mut events = Vec::new();
        while let Some(event) = subscription.recv().await {
            let terminal = event.kind.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        (self.manager.get_task(&id).await.unwrap(), events)
    }
}

pub struct TestContextBuilder {
    config: AppConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
}

impl TestContextBuilder {
    /// Route every job through the worker pool
    pub fn offload_everything(mut self) -> Self {
        self.config.optimizer.offload_pixel_threshold = 0;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut AppConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> TestContext {
        let settings = PoolSettings::from(&self.config.pool);
        let optimizer = PerformanceOptimizer::new(
            self.config.optimizer.clone(),
            settings.max_workers,
            Arc::new(BufferPool::default()),
        );
        let pool = match self.executor {
            Some(executor) => WorkerPool::new(settings, executor),
            None => WorkerPool::with_engine(settings),
        };
        let manager = TaskManager::with_parts(
            self.config.tasks.clone(),
            Arc::new(PngCodec::new()),
            Arc::new(InMemoryImageStore::new()),
            ConversionPipeline::new(pool, Arc::new(optimizer)),
        );
        TestContext {
            manager: Arc::new(manager),
        }
    }
}

/// A latch worker threads can block on
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open(&self) {
        let (open, cvar) = &*self.state;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Block the calling thread until [`Gate::open`].
    pub fn wait_open(&self) {
        let (open, cvar) = &*self.state;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cvar.wait(guard).unwrap();
        }
    }
}

/// Engine executor that holds every task until its gate opens
pub struct GatedExecutor {
    gate: Gate,
}

impl GatedExecutor {
    pub fn new(gate: Gate) -> Arc<Self> {
        Arc::new(Self { gate })
    }
}

impl TaskExecutor for GatedExecutor {
    fn execute(&self, kind: &TaskKind) -> ExecResult {
        self.gate.wait_open();
        EngineExecutor.execute(kind)
    }
}
