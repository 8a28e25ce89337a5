use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use mlua::{Lua, RegistryKey, Table};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::LoadError;
use crate::host::PluginDescriptor;
use crate::runtime::{import, path};

/// A plugin's imported module. Holds one reference into the runtime.
pub struct LoadedModule {
    module_name: String,
    module: RegistryKey,
}

impl LoadedModule {
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    fn release(self, lua: Option<&Lua>) {
        let Some(lua) = lua else {
            // The runtime is gone; the reference went with it.
            return;
        };
        if let Err(e) = lua.remove_registry_value(self.module) {
            debug!(module = %self.module_name, "module reference already released: {}", e);
        }
    }
}

/// Plugin descriptor to imported module, at most one entry per plugin.
///
/// Entries are created and released with a `&Lua` in hand, i.e. under the
/// execution lock; plain lookups only take the map's own mutex.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<HashMap<PluginDescriptor, LoadedModule>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Import `module_name` from `module_dir` for `plugin`.
    ///
    /// Returns `Ok(false)` without touching the runtime if the plugin is
    /// already loaded.
    pub fn load(
        &self,
        lua: &Lua,
        plugin: &PluginDescriptor,
        module_dir: &Path,
        module_name: &str,
    ) -> Result<bool, LoadError> {
        if self.is_loaded(plugin) {
            return Ok(false);
        }

        path::add_module_path(lua, module_dir).map_err(|source| LoadError::Path {
            plugin: plugin.id().to_string(),
            module_dir: module_dir.to_path_buf(),
            source,
        })?;
        let module = import::import_module(lua, module_name).map_err(|source| LoadError::Import {
            plugin: plugin.id().to_string(),
            module: module_name.to_string(),
            source,
        })?;
        let key = lua.create_registry_value(module)?;

        match self.modules.lock().entry(plugin.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(LoadedModule {
                    module_name: module_name.to_string(),
                    module: key,
                });
                Ok(true)
            }
        }
    }

    /// Remove and release the plugin's module.
    ///
    /// Returns the number of plugins still loaded, or `None` if `plugin` was
    /// not loaded.
    pub fn unload(&self, lua: Option<&Lua>, plugin: &PluginDescriptor) -> Option<usize> {
        let (entry, remaining) = {
            let mut modules = self.modules.lock();
            let entry = modules.remove(plugin)?;
            (entry, modules.len())
        };
        entry.release(lua);
        Some(remaining)
    }

    /// The plugin's module table, if loaded.
    pub fn module<'lua>(
        &self,
        lua: &'lua Lua,
        plugin: &PluginDescriptor,
    ) -> mlua::Result<Option<Table<'lua>>> {
        let modules = self.modules.lock();
        let Some(entry) = modules.get(plugin) else {
            return Ok(None);
        };
        let module: Table = lua.registry_value(&entry.module)?;
        Ok(Some(module))
    }

    #[must_use]
    pub fn is_loaded(&self, plugin: &PluginDescriptor) -> bool {
        self.modules.lock().contains_key(plugin)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.lock().is_empty()
    }

    #[must_use]
    pub fn plugins(&self) -> Vec<PluginDescriptor> {
        self.modules.lock().keys().cloned().collect()
    }

    /// Release every entry. Returns how many were released.
    pub fn clear(&self, lua: Option<&Lua>) -> usize {
        let drained: Vec<LoadedModule> = self.modules.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.release(lua);
        }
        count
    }
}
