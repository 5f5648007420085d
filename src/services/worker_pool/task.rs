use pixel_engine::{DitherRatio, Interpolation, Palette, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Worker task identifier, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Queue priority. Higher runs first, FIFO within a level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Dithering algorithm of a [`TaskKind::Dither`] task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DitherMethod {
    Ordered { bayer_size: usize, ratio: DitherRatio },
    /// Always covers the whole image
    FloydSteinberg,
}

/// A unit of pipeline work
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Render destination `rows` of a `width` x `height` resize
    Resize {
        source: Arc<PixelBuffer>,
        width: u32,
        height: u32,
        rows: Range<u32>,
        interpolation: Interpolation,
    },
    /// Build a palette of at most `max_colors`
    Quantize {
        image: Arc<PixelBuffer>,
        max_colors: usize,
    },
    /// Map `rows` of `image` onto `palette`
    Dither {
        image: Arc<PixelBuffer>,
        rows: Range<u32>,
        palette: Arc<Palette>,
        method: DitherMethod,
    },
    /// Post-sharpen a whole image
    PixelArt { image: Arc<PixelBuffer> },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Resize { .. } => "resize",
            TaskKind::Quantize { .. } => "quantize",
            TaskKind::Dither { .. } => "dither",
            TaskKind::PixelArt { .. } => "pixelArt",
        }
    }
}

/// Result of a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Packed RGB rows
    Pixels(Vec<u8>),
    Palette(Palette),
}

impl TaskOutput {
    pub fn into_pixels(self) -> Option<Vec<u8>> {
        match self {
            TaskOutput::Pixels(bytes) => Some(bytes),
            TaskOutput::Palette(_) => None,
        }
    }

    pub fn into_palette(self) -> Option<Palette> {
        match self {
            TaskOutput::Palette(palette) => Some(palette),
            TaskOutput::Pixels(_) => None,
        }
    }
}

/// A task submitted to the pool
#[derive(Debug, Clone)]
pub struct WorkerTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    /// Overrides the pool's default timeout
    pub timeout: Option<Duration>,
}

impl WorkerTask {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: TaskId::next(),
            kind,
            priority: TaskPriority::default(),
            timeout: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_increase() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
        assert_eq!(TaskId::from_raw(42).to_string(), "task-42");
    }

    #[test]
    fn test_priority_order() {
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
    }

    #[test]
    fn test_builder() {
        let image = Arc::new(PixelBuffer::solid(1, 1, [0, 0, 0]).unwrap());
        let task = WorkerTask::new(TaskKind::PixelArt { image })
            .with_priority(TaskPriority::High)
            .with_timeout(Duration::from_millis(10));

        assert_eq!(task.kind.name(), "pixelArt");
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.timeout, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_output_accessors() {
        let out = TaskOutput::Pixels(vec![1, 2, 3]);
        assert_eq!(out.clone().into_pixels(), Some(vec![1, 2, 3]));
        assert!(out.into_palette().is_none());
    }
}
