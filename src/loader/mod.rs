//! The Lua plugin loader.
//!
//! [`LuaPluginLoader`] owns the loader side of the bridge: the module
//! registry, the lifecycle hooks and the collector coordination. Lock order
//! is always the loader state first, then the execution lock.

pub mod api;
pub mod extension;
pub mod gc;
pub mod hooks;
mod lifecycle;
pub mod registry;
pub mod resolve;

use std::path::Path;
use std::sync::Arc;

use mlua::{Lua, Table};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::error::{self, CreateError, InitError, LoadError};
use crate::host::{IdleScheduler, Parameter, PluginDescriptor, TypeHandle, TypeRegistry};
use crate::runtime::{EmbeddedRuntime, SavedThreadState};

pub use api::PluginLoader;
pub use extension::Extension;
pub use gc::{CollectionReport, GcCoordinator};
pub use hooks::HookDispatcher;
pub use registry::ModuleRegistry;

/// Where the loader is in its lifecycle. Moves forward only; `Failed` is
/// reachable from `Initializing` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Finalized,
}

struct RuntimeState {
    phase: Phase,
    owns_runtime: bool,
    saved: Option<SavedThreadState>,
}

pub struct LuaPluginLoader {
    config: LoaderConfig,
    runtime: Arc<EmbeddedRuntime>,
    host: Arc<TypeRegistry>,
    state: Mutex<RuntimeState>,
    registry: ModuleRegistry,
    hooks: HookDispatcher,
    gc: GcCoordinator,
}

impl LuaPluginLoader {
    /// Loader on the process-wide runtime.
    pub fn new(config: LoaderConfig, host: Arc<TypeRegistry>, scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self::with_runtime(config, EmbeddedRuntime::global(), host, scheduler)
    }

    pub fn with_runtime(
        config: LoaderConfig,
        runtime: Arc<EmbeddedRuntime>,
        host: Arc<TypeRegistry>,
        scheduler: Arc<dyn IdleScheduler>,
    ) -> Self {
        let gc = GcCoordinator::new(Arc::clone(&runtime), scheduler, config.gc.max_passes);
        Self {
            hooks: HookDispatcher::new(Arc::clone(&runtime)),
            registry: ModuleRegistry::new(),
            state: Mutex::new(RuntimeState {
                phase: Phase::Uninitialized,
                owns_runtime: false,
                saved: None,
            }),
            config,
            runtime,
            host,
            gc,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Whether this loader started the runtime and will shut it down.
    #[must_use]
    pub fn owns_runtime(&self) -> bool {
        self.state.lock().owns_runtime
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<EmbeddedRuntime> {
        &self.runtime
    }

    #[must_use]
    pub fn host(&self) -> &Arc<TypeRegistry> {
        &self.host
    }

    #[must_use]
    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    #[must_use]
    pub fn gc(&self) -> &GcCoordinator {
        &self.gc
    }

    fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Load the plugin's module from its own directory.
    pub fn load(&self, plugin: &PluginDescriptor) -> Result<(), LoadError> {
        self.load_module(plugin, plugin.module_dir(), plugin.module_name())
    }

    /// Load `module_name` from `module_dir` on behalf of `plugin`.
    pub fn load_module(
        &self,
        plugin: &PluginDescriptor,
        module_dir: &Path,
        module_name: &str,
    ) -> Result<(), LoadError> {
        if !self.is_ready() {
            return Err(LoadError::NotInitialized);
        }
        let token = self.runtime.acquire();
        let Some(lua) = token.lua() else {
            return Err(LoadError::NotInitialized);
        };

        let result = self.registry.load(&lua, plugin, module_dir, module_name);
        match result {
            Ok(true) => {
                info!(plugin = %plugin, module = module_name, "loaded plugin module");
                Ok(())
            }
            Ok(false) => {
                debug!(plugin = %plugin, "plugin already loaded");
                Ok(())
            }
            Err(e) => {
                error!(plugin = %plugin, module = module_name, "{}", error::report(&e));
                Err(e)
            }
        }
    }

    /// Unload the plugin. Emptying the registry fires the
    /// `all_plugins_unloaded` hook, before any other thread can load again.
    pub fn unload(&self, plugin: &PluginDescriptor) {
        let token = self.runtime.acquire();
        let remaining = {
            let lua = token.lua();
            let remaining = self.registry.unload(lua.as_deref(), plugin);
            remaining
        };

        match remaining {
            None => debug!(plugin = %plugin, "unload of a plugin that is not loaded"),
            Some(0) => {
                info!(plugin = %plugin, "unloaded last plugin");
                self.hooks.invoke(hooks::ALL_PLUGINS_UNLOADED);
            }
            Some(remaining) => info!(plugin = %plugin, remaining, "unloaded plugin"),
        }
    }

    #[must_use]
    pub fn is_loaded(&self, plugin: &PluginDescriptor) -> bool {
        self.registry.is_loaded(plugin)
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether the plugin has a class implementing `interface`.
    pub fn provides_extension(&self, plugin: &PluginDescriptor, interface: TypeHandle) -> bool {
        let result = self.with_module(plugin, |lua, module| {
            Ok(resolve::resolve(lua, &self.host, &module, interface)?.is_some())
        });
        match result {
            Ok(found) => found,
            Err(e) => {
                warn!(plugin = %plugin, %interface, "{}", error::report(&e));
                false
            }
        }
    }

    /// Name of the class that would be instantiated for `interface`.
    pub fn extension_type_name(&self, plugin: &PluginDescriptor, interface: TypeHandle) -> Option<String> {
        self.with_module(plugin, |lua, module| {
            let resolved = resolve::resolve(lua, &self.host, &module, interface)?;
            Ok(resolved.map(|resolved| resolved.name().to_string()))
        })
        .ok()
        .flatten()
    }

    /// Create an extension implementing `interface` from the plugin.
    ///
    /// [`CreateError::NoExtensionType`] is the normal answer for plugins that
    /// do not implement the interface and is not logged.
    pub fn create_extension(
        &self,
        plugin: &PluginDescriptor,
        interface: TypeHandle,
        params: &[Parameter],
    ) -> Result<Extension, CreateError> {
        let result = self.with_module(plugin, |lua, module| {
            extension::create(lua, &self.host, &module, plugin, interface, params)
        });
        if let Err(e) = &result {
            if !e.is_no_match() {
                error!(plugin = %plugin, %interface, "{}", error::report(e));
            }
        }
        result
    }

    /// Run the Lua collector until it settles.
    pub fn collect_now(&self) -> CollectionReport {
        self.gc.collect_now()
    }

    /// Collect now and once more when the host loop is idle.
    pub fn garbage_collect(&self) -> CollectionReport {
        self.gc.request_deferred()
    }

    fn with_module<R>(
        &self,
        plugin: &PluginDescriptor,
        f: impl for<'lua> FnOnce(&'lua Lua, Table<'lua>) -> Result<R, CreateError>,
    ) -> Result<R, CreateError> {
        if !self.is_ready() {
            return Err(CreateError::NotInitialized);
        }
        let token = self.runtime.acquire();
        let Some(lua) = token.lua() else {
            return Err(CreateError::NotInitialized);
        };
        let Some(module) = self.registry.module(&lua, plugin)? else {
            return Err(CreateError::NotLoaded(plugin.id().to_string()));
        };
        let result = f(&*lua, module);
        result
    }
}

impl PluginLoader for LuaPluginLoader {
    fn initialize(&self) -> Result<(), InitError> {
        LuaPluginLoader::initialize(self)
    }

    fn finalize(&self) {
        LuaPluginLoader::finalize(self);
    }

    fn load(&self, plugin: &PluginDescriptor) -> Result<(), LoadError> {
        LuaPluginLoader::load(self, plugin)
    }

    fn unload(&self, plugin: &PluginDescriptor) {
        LuaPluginLoader::unload(self, plugin);
    }

    fn is_loaded(&self, plugin: &PluginDescriptor) -> bool {
        LuaPluginLoader::is_loaded(self, plugin)
    }

    fn provides_extension(&self, plugin: &PluginDescriptor, interface: TypeHandle) -> bool {
        LuaPluginLoader::provides_extension(self, plugin, interface)
    }

    fn create_extension(
        &self,
        plugin: &PluginDescriptor,
        interface: TypeHandle,
        params: &[Parameter],
    ) -> Result<Extension, CreateError> {
        LuaPluginLoader::create_extension(self, plugin, interface, params)
    }

    fn garbage_collect(&self) {
        LuaPluginLoader::garbage_collect(self);
    }
}

impl Drop for LuaPluginLoader {
    fn drop(&mut self) {
        self.finalize();
    }
}
