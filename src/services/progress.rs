//! Job progress events backed by a `tokio::sync::broadcast` channel.
//!
//! Every job mutation publishes a [`JobEvent`]. Subscribers either take the
//! whole stream ([`ProgressBus::subscribe`]) or only one job's events
//! ([`ProgressBus::subscribe_job`]).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{JobId, JobStatus};

/// What happened to a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEventKind {
    Queued,
    Started,
    Progress { progress: u8, step: String },
    Completed,
    Failed { error: String },
}

impl JobEventKind {
    /// Terminal events end a job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEventKind::Completed | JobEventKind::Failed { .. })
    }

    /// Job status implied by this event.
    pub fn status(&self) -> JobStatus {
        match self {
            JobEventKind::Queued => JobStatus::Queued,
            JobEventKind::Started | JobEventKind::Progress { .. } => JobStatus::Processing,
            JobEventKind::Completed => JobStatus::Completed,
            JobEventKind::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub kind: JobEventKind,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobEventKind) -> Self {
        Self {
            job_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// In-process fan-out of job events
pub struct ProgressBus {
    sender: broadcast::Sender<JobEvent>,
}

impl ProgressBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(job_id = %event.job_id, kind = ?event.kind, "Job event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Receive only events for `job_id`.
    pub fn subscribe_job(&self, job_id: &JobId) -> JobSubscription {
        JobSubscription {
            job_id: job_id.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Stream of a single job's events
pub struct JobSubscription {
    job_id: JobId,
    receiver: broadcast::Receiver<JobEvent>,
}

impl JobSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Next event for this job, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %self.job_id, skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
