//! The runtime's module search path.
//!
//! The list lives inside the runtime (a named registry value) so loaders
//! attaching to an existing runtime see and extend the same path. It is
//! mirrored into `package.path` so plugins can `require` their helpers.

use std::path::Path;

use mlua::{Lua, Table};
use tracing::debug;

use crate::error::PathError;

const SEARCH_PATH_KEY: &str = "kindling.search_path";
const BASE_PACKAGE_PATH_KEY: &str = "kindling.base_package_path";

/// Current search path, highest priority first.
pub fn search_path(lua: &Lua) -> mlua::Result<Vec<String>> {
    let Some(list) = lua.named_registry_value::<Option<Table>>(SEARCH_PATH_KEY)? else {
        return Ok(Vec::new());
    };
    let entries = list
        .sequence_values::<String>()
        .collect::<mlua::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Put `dir` at the front of the search path unless it is already present.
///
/// Returns whether the path changed. Existing entries keep their order.
pub fn add_module_path(lua: &Lua, dir: &Path) -> Result<bool, PathError> {
    let dir = dir.to_str().ok_or_else(|| PathError::NotUtf8(dir.to_path_buf()))?;
    if dir.is_empty() {
        return Err(PathError::Empty);
    }

    let mut entries = search_path(lua)?;
    if entries.iter().any(|entry| entry == dir) {
        return Ok(false);
    }
    entries.insert(0, dir.to_string());

    let list = lua.create_sequence_from(entries.iter().map(String::as_str))?;
    lua.set_named_registry_value(SEARCH_PATH_KEY, list)?;
    sync_package_path(lua, &entries)?;

    debug!(dir, entries = entries.len(), "added module path");
    Ok(true)
}

fn sync_package_path(lua: &Lua, entries: &[String]) -> mlua::Result<()> {
    let Some(package) = lua.globals().get::<_, Option<Table>>("package")? else {
        return Ok(());
    };

    let base = match lua.named_registry_value::<Option<String>>(BASE_PACKAGE_PATH_KEY)? {
        Some(base) => base,
        None => {
            let base: String = package.get::<_, Option<String>>("path")?.unwrap_or_default();
            lua.set_named_registry_value(BASE_PACKAGE_PATH_KEY, base.as_str())?;
            base
        }
    };

    let mut templates: Vec<String> = entries
        .iter()
        .flat_map(|dir| [format!("{dir}/?.lua"), format!("{dir}/?/init.lua")])
        .collect();
    if !base.is_empty() {
        templates.push(base);
    }
    package.set("path", templates.join(";"))
}
