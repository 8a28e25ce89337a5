//! The embedded Lua runtime and its execution lock.
//!
//! The Lua state lives in a process-wide slot guarded by a reentrant lock.
//! Nothing touches a Lua value, or changes a Lua reference, without an
//! [`ExecutionToken`] in scope; the token releases the lock on drop, on
//! every exit path.

pub mod i18n;
pub mod import;
pub mod interop;
pub mod path;
pub mod version;

use std::cell::{Ref, RefCell};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use mlua::Lua;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, info, warn};

static GLOBAL_RUNTIME: Lazy<Arc<EmbeddedRuntime>> = Lazy::new(|| Arc::new(EmbeddedRuntime::new()));

/// How the current thread came to hold the execution lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// The thread that started the runtime.
    Home,
    /// Any other thread, contending for the shared lock.
    Shared,
}

/// Slot holding the embedded runtime, if one is running.
pub struct EmbeddedRuntime {
    state: ReentrantMutex<RefCell<Option<Lua>>>,
    home: Mutex<Option<ThreadId>>,
}

impl EmbeddedRuntime {
    /// An empty slot. Most embedders want [`EmbeddedRuntime::global`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(None)),
            home: Mutex::new(None),
        }
    }

    /// The process-wide runtime slot.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_RUNTIME)
    }

    /// Acquire the execution lock, blocking while another thread holds it.
    /// Reentrant on the same thread.
    pub fn acquire(&self) -> ExecutionToken<'_> {
        let guard = self.state.lock();
        let current = thread::current().id();
        let mode = if *self.home.lock() == Some(current) {
            LockMode::Home
        } else {
            LockMode::Shared
        };
        ExecutionToken {
            guard,
            mode,
            home: &self.home,
        }
    }

    /// Re-acquire the lock released by [`ExecutionToken::save`].
    pub fn restore(&self, saved: SavedThreadState) -> ExecutionToken<'_> {
        let current = thread::current().id();
        if saved.thread != current {
            debug!(saved = ?saved.thread, ?current, "restoring runtime state on a different thread");
        }
        self.acquire()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.acquire().is_running()
    }

    /// Hand over a runtime started by someone else. Loaders attach to it
    /// instead of starting their own, and never shut it down.
    ///
    /// Returns `false`, dropping `lua`, if a runtime is already running.
    pub fn install(&self, lua: Lua) -> bool {
        let token = self.acquire();
        let Ok(mut slot) = token.guard.try_borrow_mut() else {
            warn!("cannot install a runtime while the current one is in use");
            return false;
        };
        if slot.is_some() {
            warn!("a runtime is already running, ignoring installed runtime");
            return false;
        }
        *slot = Some(lua);
        *self.home.lock() = Some(thread::current().id());
        debug!("installed externally started runtime");
        true
    }
}

impl Default for EmbeddedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the current thread holds the execution lock.
pub struct ExecutionToken<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Option<Lua>>>,
    mode: LockMode,
    home: &'a Mutex<Option<ThreadId>>,
}

impl ExecutionToken<'_> {
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guard.borrow().is_some()
    }

    /// The running Lua state, if any.
    ///
    /// Values obtained through it cannot outlive the token.
    #[must_use]
    pub fn lua(&self) -> Option<Ref<'_, Lua>> {
        Ref::filter_map(self.guard.borrow(), |slot| slot.as_ref()).ok()
    }

    /// Start a new runtime owned by the caller, who becomes its home thread.
    ///
    /// Returns `false` if a runtime is already running.
    pub fn start(&mut self) -> bool {
        let Ok(mut slot) = self.guard.try_borrow_mut() else {
            warn!("cannot start the runtime while Lua values are borrowed");
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(Lua::new());
        *self.home.lock() = Some(thread::current().id());
        self.mode = LockMode::Home;
        info!("started embedded Lua runtime");
        true
    }

    /// Close the runtime. Every Lua value is released.
    ///
    /// Returns `false` if nothing was running or Lua values are still borrowed.
    pub fn shutdown(&mut self) -> bool {
        let lua = match self.guard.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("cannot shut down the runtime while Lua values are borrowed");
                return false;
            }
        };
        let Some(lua) = lua else {
            return false;
        };
        drop(lua);
        *self.home.lock() = None;
        self.mode = LockMode::Shared;
        info!("embedded Lua runtime shut down");
        true
    }

    /// Release the lock, keeping a record to restore it later with
    /// [`EmbeddedRuntime::restore`].
    pub fn save(self) -> SavedThreadState {
        let thread = thread::current().id();
        drop(self);
        SavedThreadState { thread }
    }
}

/// A released execution lock, waiting to be restored at shutdown.
#[derive(Debug)]
#[must_use]
pub struct SavedThreadState {
    thread: ThreadId,
}

/// Remove the functions that let Lua code terminate or fork the host process.
pub(crate) fn restrict_process_control(lua: &Lua) -> mlua::Result<()> {
    lua.load(
        r#"
        if os then
            os.execute = nil
            os.exit = nil
        end
        if io then
            io.popen = nil
        end
    "#,
    )
    .set_name("=kindling-sandbox")
    .exec()
}
