// src/queue.rs
//! Bounded task queue
//!
//! Runs an unbounded backlog of fetch tasks while holding two limits at once:
//! at most `max_concurrent` tasks in flight, and at most
//! `max_starts_per_window` task starts inside any rolling `window`. Tasks start
//! in the order they were enqueued. A task that fails, times out or panics is
//! logged and counted, never retried, and never disturbs the bookkeeping of the
//! tasks behind it.

use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

use crate::config::QueueConfig;
use crate::error::TaskError;

type Task = BoxFuture<'static, Result<(), TaskError>>;

/// Cumulative counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub panicked: u64,
}

impl QueueStats {
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out + self.panicked
    }
}

enum Outcome {
    Succeeded,
    Failed,
    TimedOut,
    Panicked,
}

struct State {
    pending: VecDeque<Task>,
    running: usize,
    /// Start instants still inside the rolling window, oldest first
    starts: VecDeque<Instant>,
    wakeup_scheduled: bool,
    stats: QueueStats,
}

struct Inner {
    name: String,
    window: Duration,
    max_starts_per_window: usize,
    max_concurrent: usize,
    task_timeout: Option<Duration>,
    state: Mutex<State>,
    idle_tx: watch::Sender<bool>,
}

/// Cloning shares the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Caps of zero are raised to one.
    pub fn new(name: impl Into<String>, config: &QueueConfig) -> Self {
        let (idle_tx, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                window: config.window(),
                max_starts_per_window: config.max_starts_per_window.max(1),
                max_concurrent: config.max_concurrent.max(1),
                task_timeout: config.task_timeout(),
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    running: 0,
                    starts: VecDeque::new(),
                    wakeup_scheduled: false,
                    stats: QueueStats::default(),
                }),
                idle_tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Schedule `task` and return immediately. Must be called from inside a
    /// tokio runtime.
    pub fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        {
            let mut state = self.inner.lock_state();
            state.pending.push_back(Box::pin(task));
            state.stats.enqueued += 1;
            self.inner.idle_tx.send_if_modified(|idle| {
                let was_idle = *idle;
                *idle = false;
                was_idle
            });
        }
        Inner::schedule(&self.inner);
    }

    /// Tasks waiting to start
    pub fn pending(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.inner.lock_state().running
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock_state();
        state.pending.is_empty() && state.running == 0
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock_state().stats
    }

    /// Receiver whose value is `true` whenever nothing is pending or running
    pub(crate) fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.inner.idle_tx.subscribe()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start as many pending tasks as both limits allow. When only the rate
    /// limit blocks progress, arm a single timer for the moment the oldest
    /// start leaves the window.
    fn schedule(inner: &Arc<Inner>) {
        let mut ready = Vec::new();
        let mut wake_in = None;
        {
            let mut state = inner.lock_state();
            let now = Instant::now();
            while state.running < inner.max_concurrent && !state.pending.is_empty() {
                while let Some(&oldest) = state.starts.front() {
                    if now.duration_since(oldest) >= inner.window {
                        state.starts.pop_front();
                    } else {
                        break;
                    }
                }

                if state.starts.len() >= inner.max_starts_per_window {
                    if !state.wakeup_scheduled {
                        if let Some(&oldest) = state.starts.front() {
                            state.wakeup_scheduled = true;
                            wake_in = Some((oldest + inner.window).saturating_duration_since(now));
                        }
                    }
                    log::debug!(
                        "[TaskQueue:{}] rate limited, {} pending",
                        inner.name,
                        state.pending.len()
                    );
                    break;
                }

                if let Some(task) = state.pending.pop_front() {
                    state.running += 1;
                    state.starts.push_back(now);
                    state.stats.started += 1;
                    ready.push(task);
                }
            }
        }

        for task in ready {
            tokio::spawn(Inner::run(Arc::clone(inner), task));
        }

        if let Some(delay) = wake_in {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.lock_state().wakeup_scheduled = false;
                Inner::schedule(&inner);
            });
        }
    }

    async fn run(inner: Arc<Inner>, task: Task) {
        let timeout = inner.task_timeout;
        // A separate spawn keeps a panicking task from unwinding through the
        // bookkeeping below.
        let handle = tokio::spawn(async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, task).await.ok(),
                None => Some(task.await),
            }
        });

        let outcome = match handle.await {
            Ok(Some(Ok(()))) => Outcome::Succeeded,
            Ok(Some(Err(e))) => {
                log::warn!("[TaskQueue:{}] task failed: {}", inner.name, e);
                Outcome::Failed
            }
            Ok(None) => {
                log::warn!(
                    "[TaskQueue:{}] task timed out after {:?}",
                    inner.name,
                    timeout.unwrap_or_default()
                );
                Outcome::TimedOut
            }
            Err(e) => {
                log::error!("[TaskQueue:{}] task panicked: {}", inner.name, e);
                Outcome::Panicked
            }
        };

        inner.finish(outcome);
        Inner::schedule(&inner);
    }

    fn finish(&self, outcome: Outcome) {
        let mut state = self.lock_state();
        state.running = state.running.saturating_sub(1);
        match outcome {
            Outcome::Succeeded => state.stats.succeeded += 1,
            Outcome::Failed => state.stats.failed += 1,
            Outcome::TimedOut => state.stats.timed_out += 1,
            Outcome::Panicked => state.stats.panicked += 1,
        }
        if state.running == 0 && state.pending.is_empty() {
            self.idle_tx.send_replace(true);
        }
    }
}
