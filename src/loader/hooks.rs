//! Loader-internal lifecycle hooks
//!
//! The hooks live in a Lua table defined by the bootstrap script. They are
//! called from the host at fixed points and their failures are only logged.

use std::collections::HashMap;
use std::sync::Arc;

use mlua::{Function, Lua, RegistryKey, Table};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::runtime::EmbeddedRuntime;

/// Fired when the last loaded plugin is unloaded.
pub const ALL_PLUGINS_UNLOADED: &str = "all_plugins_unloaded";

/// Fired once while the loader shuts down.
pub const EXIT: &str = "exit";

/// Calls methods of the bootstrap `hooks` table
pub struct HookDispatcher {
    runtime: Arc<EmbeddedRuntime>,
    hooks: Mutex<Option<RegistryKey>>,
    invocations: Mutex<HashMap<String, usize>>,
}

impl HookDispatcher {
    pub fn new(runtime: Arc<EmbeddedRuntime>) -> Self {
        Self {
            runtime,
            hooks: Mutex::new(None),
            invocations: Mutex::new(HashMap::new()),
        }
    }

    /// Keep `hooks` for later invocation, replacing any previous table.
    pub fn install(&self, lua: &Lua, hooks: Table) -> mlua::Result<()> {
        let key = lua.create_registry_value(hooks)?;
        if let Some(previous) = self.hooks.lock().replace(key) {
            lua.remove_registry_value(previous)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.hooks.lock().is_some()
    }

    /// Invoke hook `name`, acquiring the execution lock.
    ///
    /// Returns whether the hook ran to completion. Errors are logged, never
    /// returned.
    pub fn invoke(&self, name: &str) -> bool {
        let token = self.runtime.acquire();
        let Some(lua) = token.lua() else {
            warn!(hook = name, "cannot run loader hook: runtime is not running");
            return false;
        };

        // Look the table up without holding the mutex across the call.
        let hooks = {
            let guard = self.hooks.lock();
            let Some(key) = guard.as_ref() else {
                debug!(hook = name, "loader hooks not installed");
                return false;
            };
            let hooks: mlua::Result<Table> = lua.registry_value(key);
            hooks
        };

        *self.invocations.lock().entry(name.to_string()).or_default() += 1;

        let result = hooks.and_then(|hooks| {
            let method: Function = hooks.get(name)?;
            method.call::<_, ()>(hooks)
        });
        match result {
            Ok(()) => {
                debug!(hook = name, "ran loader hook");
                true
            }
            Err(e) => {
                warn!(hook = name, "failed to run internal loader hook: {}", e);
                false
            }
        }
    }

    /// How many times hook `name` has been invoked.
    #[must_use]
    pub fn invocations(&self, name: &str) -> usize {
        self.invocations.lock().get(name).copied().unwrap_or(0)
    }

    /// Drop the hooks table. Without `lua` the reference is simply forgotten
    /// along with the runtime.
    pub fn release(&self, lua: Option<&Lua>) {
        let Some(key) = self.hooks.lock().take() else {
            return;
        };
        if let Some(lua) = lua {
            if let Err(e) = lua.remove_registry_value(key) {
                debug!("loader hooks already released: {}", e);
            }
        }
    }
}
