//! Idle scheduling on the host's event loop.
//!
//! The loader only ever needs "run this later, once, unless I remove it
//! first". [`MainLoop`] is a cooperative queue the host pumps itself;
//! [`TokioIdleScheduler`] runs idle sources on a tokio runtime.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type IdleTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a scheduled idle source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

pub trait IdleScheduler: Send + Sync {
    /// Schedule `task` to run once when the loop is idle.
    fn add_idle(&self, name: &'static str, task: IdleTask) -> SourceId;

    /// Remove a source that has not started yet. Returns `false` if it
    /// already ran, is running, or was never scheduled.
    fn remove(&self, id: SourceId) -> bool;
}

/// Cooperative single-threaded loop driven by the host.
#[derive(Default)]
pub struct MainLoop {
    next_id: AtomicU64,
    queue: Mutex<VecDeque<(SourceId, &'static str, IdleTask)>>,
}

impl MainLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every source that was pending when the iteration started.
    /// Sources added while running wait for the next iteration.
    pub fn iteration(&self) -> usize {
        let batch = self.queue.lock().len();
        let mut ran = 0;
        for _ in 0..batch {
            // Pop under the lock, run without it: tasks may schedule more work.
            let Some((id, name, task)) = self.queue.lock().pop_front() else {
                break;
            };
            debug!(source = %id, name, "dispatching idle source");
            task();
            ran += 1;
        }
        ran
    }
}

impl IdleScheduler for MainLoop {
    fn add_idle(&self, name: &'static str, task: IdleTask) -> SourceId {
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.queue.lock().push_back((id, name, task));
        id
    }

    fn remove(&self, id: SourceId) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|(queued, _, _)| *queued == id) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Idle sources executed on a tokio runtime.
///
/// A source yields once before running so it never runs inside the call
/// that scheduled it; the task itself runs on the blocking pool because it
/// may wait for the execution lock.
pub struct TokioIdleScheduler {
    handle: tokio::runtime::Handle,
    next_id: AtomicU64,
    sources: Arc<Mutex<HashMap<SourceId, CancellationToken>>>,
}

impl TokioIdleScheduler {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(0),
            sources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Scheduler bound to the runtime of the calling task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.sources.lock().len()
    }
}

impl IdleScheduler for TokioIdleScheduler {
    fn add_idle(&self, name: &'static str, task: IdleTask) -> SourceId {
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let cancel = CancellationToken::new();
        self.sources.lock().insert(id, cancel.clone());

        let sources = Arc::clone(&self.sources);
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::task::yield_now() => {}
            }
            // Claiming the entry is the start point: remove() fails from here on.
            if sources.lock().remove(&id).is_none() {
                return;
            }
            debug!(source = %id, name, "dispatching idle source");
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                warn!(source = %id, name, "idle source failed: {}", e);
            }
        });
        id
    }

    fn remove(&self, id: SourceId) -> bool {
        match self.sources.lock().remove(&id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}
