use std::time::Duration;

use pixel_engine::EngineError;
use thiserror::Error;

use crate::services::worker_pool::TaskId;

/// Failure of a single worker-pool task.
///
/// Every task submitted to the pool resolves to either its output or one of
/// these; the pool never drops a caller silently.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerError {
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    #[error("Task {task_id} timed out after {}ms", timeout.as_millis())]
    Timeout { task_id: TaskId, timeout: Duration },

    #[error("Worker {worker_id} terminated after {errors} errors: {message}")]
    WorkerTerminated {
        worker_id: usize,
        errors: u32,
        message: String,
    },

    #[error("Worker pool is closed")]
    PoolClosed,
}

/// Failure inside a conversion job. The owning job moves to `failed`.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Unexpected task output: expected {0}")]
    UnexpectedOutput(&'static str),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for ProcessingError {
    fn from(e: tokio::task::JoinError) -> Self {
        ProcessingError::Join(e.to_string())
    }
}

/// Errors returned by the task manager's public operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_task_failed() {
        let error = WorkerError::TaskFailed {
            task_id: TaskId::from_raw(7),
            message: "bad payload".to_string(),
        };
        assert_eq!(error.to_string(), "Task task-7 failed: bad payload");
    }

    #[test]
    fn test_worker_error_timeout() {
        let error = WorkerError::Timeout {
            task_id: TaskId::from_raw(3),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(error.to_string(), "Task task-3 timed out after 1500ms");
    }

    #[test]
    fn test_worker_error_terminated() {
        let error = WorkerError::WorkerTerminated {
            worker_id: 2,
            errors: 6,
            message: "boom".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Worker 2 terminated after 6 errors: boom"
        );
    }

    #[test]
    fn test_worker_error_pool_closed() {
        assert_eq!(WorkerError::PoolClosed.to_string(), "Worker pool is closed");
    }

    #[test]
    fn test_processing_error_from_engine_error() {
        let error: ProcessingError = EngineError::EmptyPalette.into();
        assert!(matches!(error, ProcessingError::Engine(_)));
        assert_eq!(error.to_string(), "Engine error: palette cannot be empty");
    }

    #[test]
    fn test_processing_error_from_worker_error() {
        let error: ProcessingError = WorkerError::PoolClosed.into();
        assert_eq!(error.to_string(), "Worker error: Worker pool is closed");
    }

    #[test]
    fn test_task_error_messages() {
        assert_eq!(
            TaskError::ImageNotFound("img_1".to_string()).to_string(),
            "Image not found: img_1"
        );
        assert_eq!(
            TaskError::TaskNotFound("job_1".to_string()).to_string(),
            "Task not found: job_1"
        );
        let error: TaskError = ProcessingError::Decode("not a png".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Processing error: Decode error: not a png"
        );
    }
}
