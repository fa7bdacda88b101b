// src/bot/scheduler.rs - Interval-driven background tasks on a dedicated scheduler task

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::bot::shutdown::ShutdownSignal;

/// Floor on every scheduler sleep, so bursts of additions are handled in one pass
pub const MIN_SLEEP: Duration = Duration::from_millis(50);

/// Upper bound on a sleep when nothing is scheduled
const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// Something that runs periodically on the scheduler task.
///
/// `interval` is read again after every run, so a task may change its own cadence.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run(&self);
}

struct Scheduled {
    due: Instant,
    seq: u64,
    task: Arc<dyn PeriodicTask>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap, the earliest due entry must be on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TaskQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl TaskQueue {
    fn push(&mut self, task: Arc<dyn PeriodicTask>, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { due, seq, task });
    }

    fn pop_due(&mut self, now: Instant) -> Option<Scheduled> {
        if self.heap.peek().map_or(false, |next| next.due <= now) {
            self.heap.pop()
        } else {
            None
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|next| next.due)
    }
}

/// Handle to the scheduler task. Cloning shares the same task.
#[derive(Clone)]
pub struct TaskScheduler {
    additions: mpsc::UnboundedSender<Arc<dyn PeriodicTask>>,
    stop: ShutdownSignal,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TaskScheduler {
    /// Spawn the scheduler task on the current runtime
    pub fn start() -> Self {
        let (additions, receiver) = mpsc::unbounded_channel();
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(Self::run_loop(receiver, stop.clone()));
        info!(target: "scheduler", "Task scheduler started");

        Self {
            additions,
            stop,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Register a task; its first run is one interval from now
    pub fn add(&self, task: Arc<dyn PeriodicTask>) {
        debug!(target: "scheduler", "Adding task '{}' every {:?}", task.name(), task.interval());
        if self.additions.send(task).is_err() {
            warn!(target: "scheduler", "Scheduler already stopped, task not added");
        }
    }

    /// Stop the scheduler after one final run of every pending task
    pub async fn shutdown(&self) {
        self.stop.trigger();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(target: "scheduler", "Scheduler task ended abnormally: {}", e);
            }
        }
    }

    async fn run_loop(mut additions: mpsc::UnboundedReceiver<Arc<dyn PeriodicTask>>, stop: ShutdownSignal) {
        let mut queue = TaskQueue::default();

        loop {
            while let Ok(task) = additions.try_recv() {
                let due = Instant::now() + task.interval();
                queue.push(task, due);
            }

            if stop.is_triggered() {
                break;
            }

            let now = Instant::now();
            if let Some(entry) = queue.pop_due(now) {
                debug!(target: "scheduler", "Running task '{}'", entry.task.name());
                entry.task.run().await;
                let interval = entry.task.interval();
                queue.push(entry.task, Instant::now() + interval);
                continue;
            }

            let wait = queue
                .next_due()
                .map(|due| due.saturating_duration_since(now))
                .unwrap_or(IDLE_SLEEP)
                .max(MIN_SLEEP);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                Some(task) = additions.recv() => {
                    let due = Instant::now() + task.interval();
                    queue.push(task, due);
                }
                _ = stop.wait() => {}
            }
        }

        while let Ok(task) = additions.try_recv() {
            let due = Instant::now() + task.interval();
            queue.push(task, due);
        }

        info!(target: "scheduler", "Flushing {} pending tasks before exit", queue.heap.len());
        while let Some(entry) = queue.heap.pop() {
            entry.task.run().await;
        }
        info!(target: "scheduler", "Task scheduler stopped");
    }
}
