//! Conversion job lifecycle.
//!
//! Jobs move `queued -> processing -> completed | failed`. A scheduler tick
//! admits the oldest queued job only while nothing else is processing, so at
//! most one full-frame conversion holds memory at a time. Stage-level
//! parallelism still happens inside the job via the worker pool.

use async_trait::async_trait;
use chrono::Utc;
use pixel_engine::PixelBuffer;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::buffer_pool::BufferPool;
use super::codec::{ImageCodec, PngCodec};
use super::image_store::{ImageStore, InMemoryImageStore};
use super::optimizer::PerformanceOptimizer;
use super::pipeline::{ConversionPipeline, ProgressSink};
use super::progress::{JobEvent, JobEventKind, JobSubscription, ProgressBus};
use super::worker_pool::{PoolSettings, PoolStatus, WorkerPool};
use crate::error::{ProcessingError, TaskError};
use crate::models::{
    AppConfig, ConversionParams, ConversionResult, ImageId, ImageMetadata, Job, JobId, JobStatus,
    TaskConfig, UploadedImage,
};

/// Job counts plus the pool view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub images: usize,
    pub pool: PoolStatus,
}

/// What a cleanup sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub jobs_removed: usize,
    pub images_removed: usize,
}

pub struct TaskManager {
    config: TaskConfig,
    codec: Arc<dyn ImageCodec>,
    images: Arc<dyn ImageStore>,
    jobs: RwLock<HashMap<JobId, Job>>,
    queue: Mutex<VecDeque<JobId>>,
    processing: AtomicBool,
    events: ProgressBus,
    pipeline: ConversionPipeline,
}

impl TaskManager {
    /// Build a manager with the engine-backed worker pool, PNG codec and
    /// in-memory image store. Must be called inside a Tokio runtime.
    pub fn new(config: &AppConfig) -> Self {
        let settings = PoolSettings::from(&config.pool);
        let optimizer = PerformanceOptimizer::new(
            config.optimizer.clone(),
            settings.max_workers,
            Arc::new(BufferPool::default()),
        );
        let pipeline =
            ConversionPipeline::new(WorkerPool::with_engine(settings), Arc::new(optimizer));

        Self::with_parts(
            config.tasks.clone(),
            Arc::new(PngCodec::new()),
            Arc::new(InMemoryImageStore::new()),
            pipeline,
        )
    }

    pub fn with_parts(
        config: TaskConfig,
        codec: Arc<dyn ImageCodec>,
        images: Arc<dyn ImageStore>,
        pipeline: ConversionPipeline,
    ) -> Self {
        Self {
            events: ProgressBus::new(config.event_capacity),
            config,
            codec,
            images,
            jobs: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
            pipeline,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        self.pipeline.pool()
    }

    pub fn codec(&self) -> &Arc<dyn ImageCodec> {
        &self.codec
    }

    pub fn events(&self) -> &ProgressBus {
        &self.events
    }

    /// Whether a job currently holds the processing slot.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Decode uploaded bytes and keep the pixels until they expire.
    pub async fn store_uploaded_image(
        &self,
        bytes: Vec<u8>,
        metadata: ImageMetadata,
    ) -> Result<ImageId, ProcessingError> {
        let byte_size = bytes.len();
        let codec = Arc::clone(&self.codec);
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes)).await??;

        let image = UploadedImage::new(decoded.pixels, byte_size, decoded.format.mime_type())
            .with_file_name(metadata.file_name);
        let id = image.id.clone();
        tracing::info!(
            image_id = %id,
            width = image.width,
            height = image.height,
            byte_size,
            "Stored uploaded image"
        );
        self.images.insert(image).await;
        Ok(id)
    }

    /// Keep pixels that were decoded elsewhere.
    pub async fn store_decoded_image(&self, pixels: PixelBuffer, mime_type: &str) -> ImageId {
        let byte_size = pixels.as_bytes().len();
        let image = UploadedImage::new(pixels, byte_size, mime_type);
        let id = image.id.clone();
        tracing::debug!(image_id = %id, width = image.width, height = image.height, "Stored decoded image");
        self.images.insert(image).await;
        id
    }

    pub async fn delete_image(&self, id: &ImageId) -> bool {
        self.images.remove(id).await
    }

    /// Queue a conversion of a stored image.
    pub async fn create_task(
        &self,
        image_id: &ImageId,
        params: ConversionParams,
    ) -> Result<JobId, TaskError> {
        let image = self
            .images
            .get(image_id)
            .await
            .ok_or_else(|| TaskError::ImageNotFound(image_id.to_string()))?;

        let params = params.normalized();
        let estimate = estimate_duration(image.width, image.height, &params);
        let job = Job::new(image_id.clone(), params, estimate);
        let id = job.id.clone();

        self.jobs.write().await.insert(id.clone(), job);
        self.queue.lock().await.push_back(id.clone());
        tracing::info!(job_id = %id, image_id = %image_id, estimated_ms = estimate, "Job queued");
        self.events.publish(JobEvent::new(id.clone(), JobEventKind::Queued));
        Ok(id)
    }

    pub async fn get_task(&self, id: &JobId) -> Result<Job, TaskError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))
    }

    /// All known jobs, oldest first.
    pub async fn list_tasks(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn subscribe(&self, id: &JobId) -> JobSubscription {
        self.events.subscribe_job(id)
    }

    /// Resolve once the job is completed or failed.
    pub async fn wait_for(&self, id: &JobId) -> Result<Job, TaskError> {
        // subscribe first so a transition between the check and recv is seen
        let mut events = self.subscribe(id);
        let job = self.get_task(id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        while let Some(event) = events.recv().await {
            if event.kind.is_terminal() {
                break;
            }
        }
        self.get_task(id).await
    }

    /// Admit the next queued job if nothing is processing.
    ///
    /// Returns the admitted job. Processing continues on a spawned task.
    pub async fn tick(self: &Arc<Self>) -> Option<JobId> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let Some((job_id, image_id, params)) = self.admit_next().await else {
            self.processing.store(false, Ordering::Release);
            return None;
        };

        let manager = Arc::clone(self);
        let admitted = job_id.clone();
        tokio::spawn(async move {
            let _slot = ProcessingSlot(&manager.processing);
            manager.process(&job_id, &image_id, &params).await;
        });
        Some(admitted)
    }

    async fn admit_next(&self) -> Option<(JobId, ImageId, ConversionParams)> {
        let mut queue = self.queue.lock().await;
        while let Some(job_id) = queue.pop_front() {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(&job_id) else {
                continue;
            };
            job.start();
            let admitted = (job_id.clone(), job.image_id.clone(), job.params.clone());
            drop(jobs);

            tracing::info!(job_id = %job_id, "Job started");
            self.events.publish(JobEvent::new(job_id, JobEventKind::Started));
            return Some(admitted);
        }
        None
    }

    async fn process(&self, job_id: &JobId, image_id: &ImageId, params: &ConversionParams) {
        let progress = JobProgress {
            manager: self,
            job_id,
        };
        progress.report(5, "Loading image").await;

        let outcome = match self.images.get(image_id).await {
            Some(image) => self.pipeline.run(image.pixels, params, &progress).await,
            None => Err(ProcessingError::ImageNotFound(image_id.to_string())),
        };

        match outcome {
            Ok(result) => self.finish(job_id, result).await,
            Err(e) => self.fail(job_id, e.to_string()).await,
        }
    }

    async fn advance(&self, job_id: &JobId, progress: u8, step: &str) {
        let updated = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(job_id) {
                Some(job) => job.advance(progress, step).then_some(job.progress),
                None => None,
            }
        };
        if let Some(progress) = updated {
            self.events.publish(JobEvent::new(
                job_id.clone(),
                JobEventKind::Progress {
                    progress,
                    step: step.to_string(),
                },
            ));
        }
    }

    async fn finish(&self, job_id: &JobId, result: ConversionResult) {
        {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            tracing::info!(
                job_id = %job_id,
                width = result.width,
                height = result.height,
                processing_time_ms = result.processing_time_ms,
                mode = ?result.execution_mode,
                "Job completed"
            );
            job.complete(result);
        }
        self.events
            .publish(JobEvent::new(job_id.clone(), JobEventKind::Completed));
    }

    async fn fail(&self, job_id: &JobId, error: String) {
        {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            tracing::error!(job_id = %job_id, error = %error, "Job failed");
            job.fail(error.clone());
        }
        self.events
            .publish(JobEvent::new(job_id.clone(), JobEventKind::Failed { error }));
    }

    /// Drop finished jobs past the job TTL and images past the image TTL.
    ///
    /// Queued and processing jobs are never evicted.
    pub async fn cleanup(&self) -> CleanupReport {
        let now = Utc::now();
        let job_cutoff = now - self.config.job_ttl();

        let jobs_removed = {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|_, job| {
                !job.status.is_terminal() || job.completed_at.unwrap_or(job.created_at) > job_cutoff
            });
            before - jobs.len()
        };
        let images_removed = self
            .images
            .evict_older_than(now - self.config.image_ttl())
            .await;

        let report = CleanupReport {
            jobs_removed,
            images_removed,
        };
        if jobs_removed > 0 || images_removed > 0 {
            tracing::info!(jobs_removed, images_removed, "Cleanup evicted expired entries");
        }
        report
    }

    pub async fn stats(&self) -> TaskStats {
        let (mut queued, mut processing, mut completed, mut failed) = (0, 0, 0, 0);
        for job in self.jobs.read().await.values() {
            match job.status {
                JobStatus::Queued => queued += 1,
                JobStatus::Processing => processing += 1,
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
            }
        }
        TaskStats {
            queued,
            processing,
            completed,
            failed,
            images: self.images.len().await,
            pool: self.pool().status().await,
        }
    }

    /// Drive the scheduler and cleanup ticks until `cancel` fires, then shut
    /// the worker pool down.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut scheduler = tokio::time::interval(self.config.scheduler_interval());
        let mut cleanup = tokio::time::interval(self.config.cleanup_interval());
        cleanup.tick().await;
        tracing::info!(
            scheduler_interval_ms = self.config.scheduler_interval_ms,
            cleanup_interval_ms = self.config.cleanup_interval_ms,
            "Task scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task scheduler shutting down");
                    break;
                }
                _ = scheduler.tick() => {
                    if let Some(job_id) = self.tick().await {
                        tracing::debug!(job_id = %job_id, "Scheduler admitted job");
                    }
                }
                _ = cleanup.tick() => {
                    self.cleanup().await;
                }
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&self) {
        self.pool().shutdown().await;
    }
}

/// Estimated conversion time in milliseconds for an image of the given size.
pub fn estimate_duration(width: u32, height: u32, params: &ConversionParams) -> u64 {
    let (w, h) = params.normalized().target_dimensions(width, height);
    let pixels = w as u64 * h as u64;
    let base = match pixels {
        0..=10_000 => 3_000,
        10_001..=100_000 => 8_000,
        100_001..=500_000 => 15_000,
        _ => 15_000 * pixels / 500_000,
    };
    if params.color_mode.dithers() {
        base * 3 / 2
    } else {
        base
    }
}

/// Releases the processing slot when the job task ends, even on panic.
struct ProcessingSlot<'a>(&'a AtomicBool);

impl Drop for ProcessingSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct JobProgress<'a> {
    manager: &'a TaskManager,
    job_id: &'a JobId,
}

#[async_trait]
impl ProgressSink for JobProgress<'_> {
    async fn report(&self, progress: u8, step: &str) {
        self.manager.advance(self.job_id, progress, step).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorMode, PoolConfig};
    use std::time::Duration;

    fn config() -> AppConfig {
        AppConfig {
            pool: PoolConfig {
                max_workers: Some(2),
                min_workers: Some(1),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn manager() -> Arc<TaskManager> {
        Arc::new(TaskManager::new(&config()))
    }

    #[test]
    fn test_estimate_thresholds() {
        let params = ConversionParams::default();
        assert_eq!(estimate_duration(100, 100, &params), 3_000);
        assert_eq!(estimate_duration(101, 100, &params), 8_000);
        assert_eq!(estimate_duration(500, 200, &params), 8_000);
        assert_eq!(estimate_duration(700, 700, &params), 15_000);
        assert_eq!(estimate_duration(1000, 1000, &params), 30_000);
    }

    #[test]
    fn test_estimate_uses_target_size_and_dithering() {
        let params = ConversionParams {
            resize_factor: 10,
            color_mode: ColorMode::OrderedDitherBayer,
            ..Default::default()
        };
        // 1000x1000 at 10% is 10k pixels
        assert_eq!(estimate_duration(1000, 1000, &params), 4_500);
    }

    #[tokio::test]
    async fn test_create_task_requires_image() {
        let manager = manager();
        let err = manager
            .create_task(&ImageId::new("img_missing"), ConversionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ImageNotFound(id) if id == "img_missing"));
    }

    #[tokio::test]
    async fn test_get_unknown_task() {
        let manager = manager();
        let err = manager.get_task(&JobId::new("job_nope")).await.unwrap_err();
        assert_eq!(err.to_string(), "Task not found: job_nope");
    }

    #[tokio::test]
    async fn test_create_task_queues_normalized_job() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(10, 10, [1, 2, 3]).unwrap(), "image/png")
            .await;
        let mut events = manager.events().subscribe();

        let id = manager
            .create_task(
                &image,
                ConversionParams {
                    resize_factor: 500,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let job = manager.get_task(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.params.resize_factor, 200);
        assert_eq!(job.estimated_duration_ms, 3_000);

        let event = events.recv().await.unwrap();
        assert_eq!(event.job_id, id);
        assert_eq!(event.kind, JobEventKind::Queued);
    }

    #[tokio::test]
    async fn test_tick_without_jobs_releases_slot() {
        let manager = manager();
        assert!(manager.tick().await.is_none());
        assert!(!manager.is_processing());
    }

    #[tokio::test]
    async fn test_tick_processes_job_to_completion() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(20, 20, [0, 255, 0]).unwrap(), "image/png")
            .await;
        let id = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();

        assert_eq!(manager.tick().await, Some(id.clone()));
        let job = manager.wait_for(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let result = job.result.unwrap();
        assert_eq!((result.width, result.height), (20, 20));
        assert_eq!(result.palette, vec!["#00ff00"]);
        assert!(job.actual_duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_progress_updates_are_recorded_and_published() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(6, 6, [1, 1, 1]).unwrap(), "image/png")
            .await;
        let id = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();
        let mut events = manager.subscribe(&id);
        let (admitted, _, _) = manager.admit_next().await.unwrap();
        assert_eq!(admitted, id);

        manager.advance(&id, 40, "Resizing").await;
        // a lower value on the same step is dropped without an event
        manager.advance(&id, 20, "Resizing").await;
        manager.advance(&id, 20, "Generating palette").await;

        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(events.recv().await.unwrap().kind);
        }
        assert!(matches!(kinds[0], JobEventKind::Started));
        assert!(matches!(
            &kinds[1],
            JobEventKind::Progress { progress: 40, step } if step == "Resizing"
        ));
        assert!(matches!(
            &kinds[2],
            JobEventKind::Progress { progress: 40, step } if step == "Generating palette"
        ));

        let job = manager.get_task(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 40);
        assert_eq!(job.current_step, "Generating palette");
    }

    #[tokio::test]
    async fn test_advance_ignores_jobs_that_are_not_processing() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(2, 2, [0, 0, 0]).unwrap(), "image/png")
            .await;
        let id = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();

        manager.advance(&id, 50, "Resizing").await;
        manager.advance(&JobId::new("job_unknown"), 50, "Resizing").await;

        let job = manager.get_task(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn test_job_fails_when_image_was_removed() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(4, 4, [0, 0, 0]).unwrap(), "image/png")
            .await;
        let id = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();
        assert!(manager.delete_image(&image).await);

        manager.tick().await;
        let job = manager.wait_for(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 5);
        assert_eq!(
            job.error.as_deref(),
            Some(format!("Image not found: {image}").as_str())
        );
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_store_uploaded_image_rejects_garbage() {
        let manager = manager();
        let err = manager
            .store_uploaded_image(b"not an image".to_vec(), ImageMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_unfinished_jobs() {
        let mut config = config();
        config.tasks.job_ttl_secs = 0;
        config.tasks.image_ttl_secs = 0;
        let manager = Arc::new(TaskManager::new(&config));

        let image = manager
            .store_decoded_image(PixelBuffer::solid(4, 4, [0, 0, 0]).unwrap(), "image/png")
            .await;
        let done = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();
        let waiting = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();
        manager.tick().await;
        manager.wait_for(&done).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = manager.cleanup().await;

        assert_eq!(
            report,
            CleanupReport {
                jobs_removed: 1,
                images_removed: 1,
            }
        );
        assert!(manager.get_task(&done).await.is_err());
        assert_eq!(
            manager.get_task(&waiting).await.unwrap().status,
            JobStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_stats_counts_jobs() {
        let manager = manager();
        let image = manager
            .store_decoded_image(PixelBuffer::solid(4, 4, [0, 0, 0]).unwrap(), "image/png")
            .await;
        manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processing + stats.completed + stats.failed, 0);
        assert_eq!(stats.images, 1);
        assert_eq!(stats.pool.max_workers, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_closes_pool() {
        let mut config = config();
        config.tasks.scheduler_interval_ms = 5;
        let manager = Arc::new(TaskManager::new(&config));
        let image = manager
            .store_decoded_image(PixelBuffer::solid(8, 8, [9, 9, 9]).unwrap(), "image/png")
            .await;
        let id = manager
            .create_task(&image, ConversionParams::default())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&manager).run(cancel.clone()));

        let job = manager.wait_for(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        cancel.cancel();
        handle.await.unwrap();
        assert!(manager.pool().is_closed());
    }
}
