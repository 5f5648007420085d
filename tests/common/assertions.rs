//! Assertion helpers for tests.

use pixel_engine::PixelBuffer;
use pixelize::models::{Job, JobStatus};
use pixelize::services::{JobEvent, JobEventKind};
use pretty_assertions::assert_eq;

/// Assert the job completed with a result
pub fn assert_completed(job: &Job) {
    assert_eq!(
        job.status,
        JobStatus::Completed,
        "Job {} failed: {:?}",
        job.id,
        job.error
    );
    assert_eq!(job.progress, 100);
    assert!(job.result.is_some(), "Completed job has no result");
    assert!(job.error.is_none());
}

/// Assert every pixel of `image` is one of the `#rrggbb` colors in `palette`
pub fn assert_within_palette(image: &PixelBuffer, palette: &[String]) {
    for (i, px) in image.as_bytes().chunks_exact(3).enumerate() {
        let hex = format!("#{:02x}{:02x}{:02x}", px[0], px[1], px[2]);
        assert!(
            palette.contains(&hex),
            "Pixel {i} has color {hex} outside palette {palette:?}"
        );
    }
}

/// Assert progress events never go backwards and stay below 100
pub fn assert_progress_monotonic(events: &[JobEvent]) {
    let mut last = 0u8;
    for event in events {
        if let JobEventKind::Progress { progress, step } = &event.kind {
            assert!(
                *progress >= last,
                "Progress went from {last} to {progress} at step {step:?}"
            );
            assert!(*progress < 100, "Running progress reached {progress}");
            last = *progress;
        }
    }
}
