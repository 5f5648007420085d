use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;

use super::executor::TaskExecutor;
use super::task::{TaskId, TaskKind, TaskOutput};

/// Work handed to a worker thread
pub(super) struct Assignment {
    pub task_id: TaskId,
    pub kind: TaskKind,
}

/// Report sent back to the pool when a thread finishes a task
pub(super) struct Completion {
    pub worker_id: usize,
    pub generation: u64,
    pub task_id: TaskId,
    pub result: Result<TaskOutput, String>,
}

/// Pool-side bookkeeping for one worker
#[derive(Debug)]
pub struct WorkerState {
    pub id: usize,
    /// Bumped whenever the slot gets a fresh thread
    pub generation: u64,
    /// Busy iff set
    pub current_task: Option<TaskId>,
    pub completed_tasks: u64,
    pub errors: u32,
    pub last_used: Instant,
}

impl WorkerState {
    fn new(id: usize, generation: u64) -> Self {
        Self {
            id,
            generation,
            current_task: None,
            completed_tasks: 0,
            errors: 0,
            last_used: Instant::now(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current_task.is_some()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            busy: self.is_busy(),
            current_task: self.current_task,
            completed_tasks: self.completed_tasks,
            errors: self.errors,
            idle_ms: if self.is_busy() {
                0
            } else {
                self.last_used.elapsed().as_millis() as u64
            },
        }
    }
}

/// Snapshot of a worker for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub id: usize,
    pub busy: bool,
    pub current_task: Option<TaskId>,
    pub completed_tasks: u64,
    pub errors: u32,
    pub idle_ms: u64,
}

/// A worker slot: state plus the inbox of its current thread
pub(super) struct Worker {
    pub state: WorkerState,
    inbox: std_mpsc::Sender<Assignment>,
}

impl Worker {
    /// Start a worker thread for slot `id`.
    pub fn spawn(
        id: usize,
        generation: u64,
        executor: Arc<dyn TaskExecutor>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> std::io::Result<Self> {
        let inbox = spawn_thread(id, generation, executor, completions)?;
        Ok(Self {
            state: WorkerState::new(id, generation),
            inbox,
        })
    }

    /// Replace the thread behind this slot. The old thread exits once its
    /// current task returns; its completion carries the old generation.
    pub fn respawn(
        &mut self,
        executor: Arc<dyn TaskExecutor>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> std::io::Result<()> {
        let generation = self.state.generation + 1;
        self.inbox = spawn_thread(self.state.id, generation, executor, completions)?;
        self.state.generation = generation;
        self.state.current_task = None;
        self.state.last_used = Instant::now();
        Ok(())
    }

    /// Hand a task to the thread. Fails if the thread is gone.
    pub fn send(&mut self, task_id: TaskId, kind: TaskKind) -> Result<(), TaskKind> {
        self.inbox
            .send(Assignment { task_id, kind })
            .map_err(|e| e.0.kind)?;
        self.state.current_task = Some(task_id);
        self.state.last_used = Instant::now();
        Ok(())
    }
}

fn spawn_thread(
    id: usize,
    generation: u64,
    executor: Arc<dyn TaskExecutor>,
    completions: mpsc::UnboundedSender<Completion>,
) -> std::io::Result<std_mpsc::Sender<Assignment>> {
    let (tx, rx) = std_mpsc::channel::<Assignment>();
    thread::Builder::new()
        .name(format!("pixel-worker-{id}"))
        .spawn(move || {
            // Ends when the pool drops the sender.
            while let Ok(Assignment { task_id, kind }) = rx.recv() {
                let result = run_task(executor.as_ref(), &kind);
                drop(kind);
                let completion = Completion {
                    worker_id: id,
                    generation,
                    task_id,
                    result,
                };
                if completions.send(completion).is_err() {
                    break;
                }
            }
            tracing::trace!(worker_id = id, generation, "Worker thread exiting");
        })?;
    Ok(tx)
}

fn run_task(executor: &dyn TaskExecutor, kind: &TaskKind) -> Result<TaskOutput, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(kind))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("worker panicked: {message}"))
        }
    }
}
