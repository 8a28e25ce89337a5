//! Bringing the runtime up for plugins and tearing it down again.

use std::sync::Arc;

use mlua::{Lua, Table, Value};
use tracing::{debug, error, info};

use crate::error::{self, InitError};
use crate::loader::{hooks, LuaPluginLoader, Phase};
use crate::runtime::{i18n, interop, path, restrict_process_control, version, ExecutionToken};

const BOOTSTRAP_SOURCE: &str = include_str!("bootstrap.lua");
const BOOTSTRAP_CHUNK_NAME: &str = "@kindling-loader-internal.lua";

impl LuaPluginLoader {
    /// Start the runtime, or attach to the one already running, and install
    /// everything plugins rely on.
    ///
    /// Calling it again after success is a no-op. After a failure the loader
    /// stays `Failed`; only [`LuaPluginLoader::finalize`] is useful then.
    pub fn initialize(&self) -> Result<(), InitError> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Ready => return Ok(()),
            Phase::Uninitialized => {}
            phase => return Err(InitError::InvalidPhase(phase)),
        }
        state.phase = Phase::Initializing;

        let mut token = self.runtime.acquire();
        let owns_runtime = !token.is_running() && token.start();
        if !owns_runtime {
            debug!(mode = ?token.mode(), "attaching to the running Lua runtime");
        }
        state.owns_runtime = owns_runtime;

        let configured = self.configure(&token, owns_runtime);
        match configured {
            Ok(()) => {
                state.phase = Phase::Ready;
                if owns_runtime {
                    // Leave the runtime idle so other threads can use it.
                    state.saved = Some(token.save());
                } else {
                    drop(token);
                }
                info!(owns_runtime, "Lua plugin loader initialized");
                Ok(())
            }
            Err(e) => {
                drop(token);
                state.phase = Phase::Failed;
                error!("{}", error::report(&e));
                error!(
                    "Please check the installation of the Lua support files in '{}'",
                    self.config.runtime.support_dir.display()
                );
                Err(e)
            }
        }
    }

    fn configure(&self, token: &ExecutionToken<'_>, owns_runtime: bool) -> Result<(), InitError> {
        let Some(lua) = token.lua() else {
            return Err(InitError::Runtime(mlua::Error::RuntimeError(
                "the embedded runtime failed to start".to_string(),
            )));
        };

        let version = version::check(&lua)?;
        debug!(%version, "runtime version is compatible");

        set_program_name(&lua, &self.config.runtime.resolved_program_name())?;

        let support_dir = &self.config.runtime.support_dir;
        path::add_module_path(&lua, support_dir).map_err(|source| InitError::SearchPath {
            path: support_dir.clone(),
            source,
        })?;

        interop::install(&lua, Arc::clone(&self.host), Arc::downgrade(&self.runtime))
            .map_err(InitError::Interop)?;
        i18n::install(&lua, &self.config.localization)?;

        if owns_runtime && self.config.runtime.sandbox {
            restrict_process_control(&lua)?;
        }

        let hooks = run_bootstrap(&lua)?;
        self.hooks.install(&lua, hooks)?;
        Ok(())
    }

    /// Release everything the loader holds in the runtime and, if the loader
    /// started it, shut the runtime down. Safe to call repeatedly and after
    /// a failed initialization.
    pub fn finalize(&self) {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Finalized => return,
            Phase::Uninitialized => {
                state.phase = Phase::Finalized;
                return;
            }
            _ => {}
        }
        let was_ready = state.phase == Phase::Ready;

        let mut token = match state.saved.take() {
            Some(saved) => self.runtime.restore(saved),
            None => self.runtime.acquire(),
        };

        let released = {
            let lua = token.lua();
            let released = self.registry.clear(lua.as_deref());
            released
        };
        if released > 0 {
            debug!(released, "released plugin modules");
        }

        if self.hooks.is_installed() {
            self.hooks.invoke(hooks::EXIT);
            let lua = token.lua();
            self.hooks.release(lua.as_deref());
        }

        // Nothing scheduled may fire into a runtime that is about to go away.
        self.gc.cancel_pending();
        if was_ready {
            let report = self.gc.collect_now();
            debug!(passes = report.passes, freed = report.freed_bytes, "final collection");
        }

        if state.owns_runtime {
            token.shutdown();
        }
        drop(token);

        state.owns_runtime = false;
        state.phase = Phase::Finalized;
        info!("Lua plugin loader finalized");
    }
}

/// Make `arg[0]` the program name, unless the runtime already has one.
fn set_program_name(lua: &Lua, name: &str) -> mlua::Result<()> {
    let globals = lua.globals();
    let arg = match globals.raw_get::<_, Option<Table>>("arg")? {
        Some(arg) => arg,
        None => {
            let arg = lua.create_table()?;
            globals.raw_set("arg", arg.clone())?;
            arg
        }
    };
    if matches!(arg.raw_get::<_, Value>(0)?, Value::Nil) {
        arg.raw_set(0, name)?;
    }
    Ok(())
}

fn run_bootstrap<'lua>(lua: &'lua Lua) -> Result<Table<'lua>, InitError> {
    if !i18n::is_installed(lua)? {
        return Err(InitError::MissingLocalization);
    }

    let env = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.raw_set("__index", lua.globals())?;
    env.set_metatable(Some(meta));

    lua.load(BOOTSTRAP_SOURCE)
        .set_name(BOOTSTRAP_CHUNK_NAME)
        .set_environment(env.clone())
        .exec()
        .map_err(InitError::Bootstrap)?;

    let hooks = env
        .raw_get::<_, Option<Table>>("hooks")
        .map_err(InitError::Bootstrap)?;
    hooks.ok_or(InitError::MissingHooks)
}
