use chrono::{DateTime, Utc};
use pixel_engine::PixelBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::image::ImageId;
use super::params::ConversionParams;

/// Prefix of every job id
pub const JOB_ID_PREFIX: &str = "job_";

/// Highest progress reported before a job completes
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Conversion job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("{JOB_ID_PREFIX}{}", super::random_hex()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where the pipeline stages ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A blocking task on the runtime's blocking pool
    Inline,
    /// Chunked tasks on the worker pool
    Pooled,
}

/// Output of a completed conversion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    #[serde(skip)]
    pub pixels: Arc<PixelBuffer>,
    pub width: u32,
    pub height: u32,
    /// Palette as lowercase `#rrggbb` strings
    pub palette: Vec<String>,
    pub processing_time_ms: u64,
    pub execution_mode: ExecutionMode,
    /// Number of row chunks the resize ran in
    pub chunks: usize,
}

/// A conversion job and its lifecycle state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub image_id: ImageId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub params: ConversionParams,
    pub result: Option<ConversionResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_duration_ms: u64,
    pub actual_duration_ms: Option<u64>,
}

impl Job {
    pub fn new(image_id: ImageId, params: ConversionParams, estimated_duration_ms: u64) -> Self {
        Self {
            id: JobId::generate(),
            image_id,
            status: JobStatus::Queued,
            progress: 0,
            current_step: "Queued".to_string(),
            params,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_duration_ms,
            actual_duration_ms: None,
        }
    }

    /// Move from queued to processing.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.current_step = "Starting".to_string();
    }

    /// Record progress while processing.
    ///
    /// Progress never decreases and stays below 100 until [`Job::complete`].
    /// Returns false when the update was ignored.
    pub fn advance(&mut self, progress: u8, step: &str) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let progress = progress.min(MAX_RUNNING_PROGRESS).max(self.progress);
        if progress == self.progress && step == self.current_step {
            return false;
        }
        self.progress = progress;
        self.current_step = step.to_string();
        true
    }

    pub fn complete(&mut self, result: ConversionResult) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = "Completed".to_string();
        self.result = Some(result);
        self.finish();
    }

    /// Mark the job failed. Progress keeps its last value.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.current_step = "Failed".to_string();
        self.error = Some(message.into());
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.actual_duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
    }
}
