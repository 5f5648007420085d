//! Bounded pool of worker threads for CPU-bound pipeline stages.
//!
//! One tokio task (the pool actor) owns every piece of pool state: worker
//! slots, the priority queue and in-flight tasks. Callers hold a cloneable
//! [`WorkerPool`] handle and talk to the actor over a channel; worker threads
//! report back over another. Nothing outside the actor mutates pool state.
//!
//! # Policy
//!
//! - Workers are spawned on demand up to `max_workers`.
//! - Queued tasks run highest priority first, FIFO within a priority.
//! - Each dispatched task has a watchdog. On expiry the caller gets
//!   [`WorkerError::Timeout`] and the slot gets a fresh thread; the stale
//!   thread's result is discarded when it arrives.
//! - A worker whose error count exceeds `max_worker_errors` is removed.
//! - Idle workers above `min_workers` are evicted after `idle_timeout`,
//!   checked every `idle_timeout / 2`.
//! - Shutdown rejects queued and in-flight tasks with
//!   [`WorkerError::PoolClosed`].

mod executor;
mod task;
mod worker;

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::WorkerError;
use crate::models::PoolConfig;
use worker::{Completion, Worker};

pub use executor::{EngineExecutor, ExecResult, TaskExecutor};
pub use task::{DitherMethod, TaskId, TaskKind, TaskOutput, TaskPriority, WorkerTask};
pub use worker::{WorkerState, WorkerStats};

/// Resolved pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_workers: usize,
    pub min_workers: usize,
    pub task_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_worker_errors: u32,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_workers: config.resolved_max_workers(),
            min_workers: config.resolved_min_workers(),
            task_timeout: config.task_timeout(),
            idle_timeout: config.idle_timeout(),
            max_worker_errors: config.max_worker_errors,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub max_workers: usize,
    pub min_workers: usize,
    pub workers: Vec<WorkerStats>,
}

impl PoolStatus {
    fn closed(settings: &PoolSettings) -> Self {
        Self {
            total_workers: 0,
            busy_workers: 0,
            idle_workers: 0,
            queued_tasks: 0,
            max_workers: settings.max_workers,
            min_workers: settings.min_workers,
            workers: Vec::new(),
        }
    }
}

type Reply = oneshot::Sender<Result<TaskOutput, WorkerError>>;

enum Command {
    Submit { task: WorkerTask, reply: Reply },
    Status(oneshot::Sender<PoolStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Watchdog notification
struct Expired {
    worker_id: usize,
    generation: u64,
    task_id: TaskId,
}

/// Handle to a running worker pool
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
    settings: Arc<PoolSettings>,
}

impl WorkerPool {
    /// Start the pool actor. Must be called within a Tokio runtime.
    pub fn new(settings: PoolSettings, executor: Arc<dyn TaskExecutor>) -> Self {
        let settings = Arc::new(settings);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let actor = PoolActor {
            settings: Arc::clone(&settings),
            executor,
            workers: BTreeMap::new(),
            next_worker_id: 0,
            queue: BinaryHeap::new(),
            next_seq: 0,
            in_flight: HashMap::new(),
            completions_tx,
            expired_tx,
        };
        tokio::spawn(actor.run(commands_rx, completions_rx, expired_rx));

        tracing::info!(
            max_workers = settings.max_workers,
            min_workers = settings.min_workers,
            task_timeout_ms = settings.task_timeout.as_millis() as u64,
            "Worker pool started"
        );
        Self { commands, settings }
    }

    /// Pool running tasks with pixel-engine.
    pub fn with_engine(settings: PoolSettings) -> Self {
        Self::new(settings, Arc::new(EngineExecutor))
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Queue a task. The returned handle resolves once it finishes.
    ///
    /// Submission order is preserved: tasks submitted earlier reach the
    /// queue first.
    pub fn submit(&self, task: WorkerTask) -> PendingTask {
        let task_id = task.id;
        let (reply, rx) = oneshot::channel();
        // On a closed pool the reply sender is dropped with the command.
        let _ = self.commands.send(Command::Submit { task, reply });
        PendingTask { task_id, rx }
    }

    pub async fn execute_task(&self, task: WorkerTask) -> Result<TaskOutput, WorkerError> {
        self.submit(task).wait().await
    }

    pub async fn status(&self) -> PoolStatus {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Status(tx)).is_err() {
            return PoolStatus::closed(&self.settings);
        }
        rx.await
            .unwrap_or_else(|_| PoolStatus::closed(&self.settings))
    }

    /// Stop every worker and reject outstanding tasks. Idempotent.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// A submitted task awaiting its result
pub struct PendingTask {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<TaskOutput, WorkerError>>,
}

impl PendingTask {
    pub fn id(&self) -> TaskId {
        self.task_id
    }

    pub async fn wait(self) -> Result<TaskOutput, WorkerError> {
        self.rx.await.unwrap_or(Err(WorkerError::PoolClosed))
    }
}

struct Queued {
    priority: TaskPriority,
    seq: u64,
    task: WorkerTask,
    reply: Reply,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

struct InFlight {
    reply: Reply,
    timeout: Duration,
    watchdog: JoinHandle<()>,
}

struct PoolActor {
    settings: Arc<PoolSettings>,
    executor: Arc<dyn TaskExecutor>,
    workers: BTreeMap<usize, Worker>,
    next_worker_id: usize,
    queue: BinaryHeap<Queued>,
    next_seq: u64,
    in_flight: HashMap<TaskId, InFlight>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    expired_tx: mpsc::UnboundedSender<Expired>,
}

impl PoolActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut expired: mpsc::UnboundedReceiver<Expired>,
    ) {
        let sweep_period = (self.settings.idle_timeout / 2).max(Duration::from_millis(1));
        let mut sweep = tokio::time::interval_at(Instant::now() + sweep_period, sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { task, reply }) => self.submit(task, reply),
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(expiry) = expired.recv() => self.on_expired(expiry),
                _ = sweep.tick() => self.evict_idle(),
            }
        }
    }

    fn submit(&mut self, task: WorkerTask, reply: Reply) {
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::trace!(
            task_id = %task.id,
            kind = task.kind.name(),
            priority = ?task.priority,
            "Task queued"
        );
        self.queue.push(Queued {
            priority: task.priority,
            seq,
            task,
            reply,
        });
        self.dispatch();
    }

    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker_id) = self.available_worker() else {
                break;
            };
            let Some(queued) = self.queue.pop() else {
                break;
            };
            self.assign(worker_id, queued);
        }
    }

    /// An idle worker, scaling up when none is free.
    fn available_worker(&mut self) -> Option<usize> {
        if let Some(id) = self
            .workers
            .values()
            .find(|w| !w.state.is_busy())
            .map(|w| w.state.id)
        {
            return Some(id);
        }
        if self.workers.len() >= self.settings.max_workers {
            return None;
        }

        let id = self.next_worker_id;
        match Worker::spawn(
            id,
            0,
            Arc::clone(&self.executor),
            self.completions_tx.clone(),
        ) {
            Ok(worker) => {
                self.next_worker_id += 1;
                self.workers.insert(id, worker);
                tracing::info!(
                    worker_id = id,
                    total_workers = self.workers.len(),
                    "Scaled up worker pool"
                );
                Some(id)
            }
            Err(e) => {
                tracing::error!(%e, "Failed to spawn worker thread");
                None
            }
        }
    }

    fn assign(&mut self, worker_id: usize, queued: Queued) {
        let Queued {
            priority,
            seq,
            task,
            reply,
        } = queued;
        let WorkerTask {
            id: task_id,
            kind,
            timeout,
            ..
        } = task;

        let Some(worker) = self.workers.get_mut(&worker_id) else {
            return;
        };
        if let Err(kind) = worker.send(task_id, kind) {
            tracing::warn!(worker_id, "Worker thread gone, removing");
            self.workers.remove(&worker_id);
            self.queue.push(Queued {
                priority,
                seq,
                task: WorkerTask {
                    id: task_id,
                    kind,
                    priority,
                    timeout,
                },
                reply,
            });
            return;
        }

        let generation = worker.state.generation;
        let timeout = timeout.unwrap_or(self.settings.task_timeout);
        let expired_tx = self.expired_tx.clone();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expired_tx.send(Expired {
                worker_id,
                generation,
                task_id,
            });
        });

        tracing::debug!(%task_id, worker_id, "Task dispatched");
        self.in_flight.insert(
            task_id,
            InFlight {
                reply,
                timeout,
                watchdog,
            },
        );
    }

    fn on_completion(&mut self, completion: Completion) {
        let Completion {
            worker_id,
            generation,
            task_id,
            result,
        } = completion;

        let Some(worker) = self.workers.get_mut(&worker_id) else {
            tracing::debug!(%task_id, worker_id, "Discarding result from removed worker");
            return;
        };
        if worker.state.generation != generation || worker.state.current_task != Some(task_id) {
            tracing::debug!(%task_id, worker_id, generation, "Discarding stale result");
            return;
        }

        worker.state.current_task = None;
        worker.state.last_used = std::time::Instant::now();
        let in_flight = self.in_flight.remove(&task_id);
        if let Some(in_flight) = &in_flight {
            in_flight.watchdog.abort();
        }

        let outcome = match result {
            Ok(output) => {
                worker.state.completed_tasks += 1;
                Ok(output)
            }
            Err(message) => {
                worker.state.errors += 1;
                let errors = worker.state.errors;
                if errors > self.settings.max_worker_errors {
                    self.terminate(worker_id, errors);
                    Err(WorkerError::WorkerTerminated {
                        worker_id,
                        errors,
                        message,
                    })
                } else {
                    tracing::debug!(%task_id, worker_id, errors, %message, "Task failed");
                    Err(WorkerError::TaskFailed { task_id, message })
                }
            }
        };

        if let Some(in_flight) = in_flight {
            let _ = in_flight.reply.send(outcome);
        }
        self.dispatch();
    }

    fn on_expired(&mut self, expiry: Expired) {
        let Expired {
            worker_id,
            generation,
            task_id,
        } = expiry;

        let Some(worker) = self.workers.get_mut(&worker_id) else {
            return;
        };
        if worker.state.generation != generation || worker.state.current_task != Some(task_id) {
            return;
        }
        let Some(in_flight) = self.in_flight.remove(&task_id) else {
            return;
        };

        worker.state.errors += 1;
        let errors = worker.state.errors;
        tracing::warn!(
            %task_id,
            worker_id,
            timeout_ms = in_flight.timeout.as_millis() as u64,
            "Task timed out"
        );
        let _ = in_flight.reply.send(Err(WorkerError::Timeout {
            task_id,
            timeout: in_flight.timeout,
        }));

        if errors > self.settings.max_worker_errors {
            self.terminate(worker_id, errors);
        } else if let Err(e) =
            worker.respawn(Arc::clone(&self.executor), self.completions_tx.clone())
        {
            tracing::error!(%e, worker_id, "Failed to replace timed-out worker thread");
            self.workers.remove(&worker_id);
        }
        self.dispatch();
    }

    fn terminate(&mut self, worker_id: usize, errors: u32) {
        self.workers.remove(&worker_id);
        tracing::warn!(
            worker_id,
            errors,
            total_workers = self.workers.len(),
            "Worker exceeded error threshold, terminated"
        );
    }

    fn evict_idle(&mut self) {
        let min = self.settings.min_workers;
        if self.workers.len() <= min {
            return;
        }

        let idle_timeout = self.settings.idle_timeout;
        let mut idle: Vec<(usize, std::time::Instant)> = self
            .workers
            .values()
            .filter(|w| !w.state.is_busy() && w.state.last_used.elapsed() >= idle_timeout)
            .map(|w| (w.state.id, w.state.last_used))
            .collect();
        idle.sort_by_key(|(_, last_used)| *last_used);

        for (id, _) in idle {
            if self.workers.len() <= min {
                break;
            }
            self.workers.remove(&id);
            tracing::info!(
                worker_id = id,
                total_workers = self.workers.len(),
                "Evicted idle worker"
            );
        }
    }

    fn status(&self) -> PoolStatus {
        let workers: Vec<WorkerStats> = self.workers.values().map(|w| w.state.stats()).collect();
        let busy = workers.iter().filter(|w| w.busy).count();
        PoolStatus {
            total_workers: workers.len(),
            busy_workers: busy,
            idle_workers: workers.len() - busy,
            queued_tasks: self.queue.len(),
            max_workers: self.settings.max_workers,
            min_workers: self.settings.min_workers,
            workers,
        }
    }

    fn shutdown(&mut self) {
        let queued = self.queue.len();
        let in_flight = self.in_flight.len();

        for queued in self.queue.drain() {
            let _ = queued.reply.send(Err(WorkerError::PoolClosed));
        }
        for (_, task) in self.in_flight.drain() {
            task.watchdog.abort();
            let _ = task.reply.send(Err(WorkerError::PoolClosed));
        }
        let workers = self.workers.len();
        self.workers.clear();

        tracing::info!(workers, queued, in_flight, "Worker pool shut down");
    }
}
