//! Coordinating the Lua collector with host reference counting.
//!
//! Host objects free their Lua halves as soon as the last host reference
//! drops; what remains for the Lua collector is garbage reachable only from
//! Lua, including cycles. [`GcCoordinator`] runs it to quiescence on demand
//! and coalesces deferred requests into one idle task.

use std::sync::Arc;

use mlua::Lua;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::host::{IdleScheduler, SourceId};
use crate::runtime::EmbeddedRuntime;

const DEFERRED_SOURCE_NAME: &str = "kindling-gc";

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Collector passes run, including the final pass that freed nothing.
    pub passes: usize,
    pub freed_bytes: usize,
}

pub struct GcCoordinator {
    runtime: Arc<EmbeddedRuntime>,
    scheduler: Arc<dyn IdleScheduler>,
    pending: Arc<Mutex<Option<SourceId>>>,
    max_passes: usize,
}

impl GcCoordinator {
    pub fn new(runtime: Arc<EmbeddedRuntime>, scheduler: Arc<dyn IdleScheduler>, max_passes: usize) -> Self {
        Self {
            runtime,
            scheduler,
            pending: Arc::new(Mutex::new(None)),
            max_passes: max_passes.max(1),
        }
    }

    /// Collect until a pass frees nothing.
    pub fn collect_now(&self) -> CollectionReport {
        collect(&self.runtime, self.max_passes)
    }

    /// Collect now, then once more when the host loop is idle. Requests made
    /// while a deferred collection is pending share it.
    pub fn request_deferred(&self) -> CollectionReport {
        let report = self.collect_now();

        let mut pending = self.pending.lock();
        if pending.is_none() {
            let runtime = Arc::clone(&self.runtime);
            let marker = Arc::clone(&self.pending);
            let max_passes = self.max_passes;
            let id = self.scheduler.add_idle(
                DEFERRED_SOURCE_NAME,
                Box::new(move || {
                    marker.lock().take();
                    let report = collect(&runtime, max_passes);
                    debug!(passes = report.passes, freed = report.freed_bytes, "deferred collection finished");
                }),
            );
            debug!(source = %id, "scheduled deferred collection");
            *pending = Some(id);
        }
        report
    }

    /// Cancel the deferred collection if it has not started.
    pub fn cancel_pending(&self) -> bool {
        let Some(id) = self.pending.lock().take() else {
            return false;
        };
        let removed = self.scheduler.remove(id);
        if removed {
            debug!(source = %id, "cancelled deferred collection");
        }
        removed
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

fn collect(runtime: &EmbeddedRuntime, max_passes: usize) -> CollectionReport {
    let token = runtime.acquire();
    let Some(lua) = token.lua() else {
        return CollectionReport::default();
    };
    let report = collect_until_quiescent(&lua, max_passes);
    report
}

pub(crate) fn collect_until_quiescent(lua: &Lua, max_passes: usize) -> CollectionReport {
    let mut report = CollectionReport::default();
    loop {
        if report.passes >= max_passes {
            warn!(passes = report.passes, "garbage collection did not settle");
            break;
        }
        let before = lua.used_memory();
        lua.expire_registry_values();
        if let Err(e) = lua.gc_collect() {
            warn!("garbage collection failed: {}", e);
            break;
        }
        let freed = before.saturating_sub(lua.used_memory());
        report.passes += 1;
        report.freed_bytes += freed;
        if freed == 0 {
            break;
        }
    }
    report
}
