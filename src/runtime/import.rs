//! Importing plugin modules.
//!
//! A module is a Lua file on the search path, executed in its own namespace.
//! The namespace records its top-level definitions in the order they were
//! first assigned, which is the order extension types are resolved in.

use std::fs;
use std::path::{Path, PathBuf};

use mlua::{Function, Lua, Table, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ImportError;
use crate::runtime::path;

static MODULE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid module name regex")
});

const MODULES_KEY: &str = "kindling.modules";
const NAMESPACE_FACTORY_KEY: &str = "kindling.namespace_factory";
const IMPORTING_KEY: &str = "kindling.importing";

// Returns the environment proxy plus the tables it writes through to.
const NAMESPACE_FACTORY: &str = r#"
return function(globals)
    local values, order, seen = {}, {}, {}
    local env = setmetatable({}, {
        __index = function(_, key)
            local value = values[key]
            if value ~= nil then
                return value
            end
            return globals[key]
        end,
        __newindex = function(_, key, value)
            if not seen[key] then
                seen[key] = true
                order[#order + 1] = key
            end
            values[key] = value
        end,
    })
    return env, values, order
end
"#;

/// Import `name`, reusing the runtime's cached module if it was imported
/// before. Dotted names map to nested directories; parent packages are not
/// imported. A module that fails to execute is not cached.
pub fn import_module<'lua>(lua: &'lua Lua, name: &str) -> Result<Table<'lua>, ImportError> {
    if !MODULE_NAME_RE.is_match(name) {
        return Err(ImportError::InvalidName(name.to_string()));
    }

    let cache = module_cache(lua)?;
    if let Some(module) = cache.raw_get::<_, Option<Table>>(name)? {
        return Ok(module);
    }

    let searched = path::search_path(lua)?;
    let Some(file) = locate(&searched, name) else {
        return Err(ImportError::NotFound {
            name: name.to_string(),
            searched,
        });
    };
    let source = fs::read(&file).map_err(|source| ImportError::Io {
        path: file.clone(),
        source,
    })?;
    let file_name = file.display().to_string();

    let factory = namespace_factory(lua)?;
    let (env, values, order): (Table, Table, Table) = factory.call(lua.globals())?;

    let importing = importing_stack(lua)?;
    let depth = importing.raw_len() + 1;
    importing.raw_set(depth, name)?;
    let executed = lua
        .load(source.as_slice())
        .set_name(format!("@{file_name}"))
        .set_environment(env.clone())
        .call::<_, ()>((name, file_name.as_str()));
    importing.raw_set(depth, Value::Nil)?;
    executed.map_err(|source| ImportError::Execution {
        name: name.to_string(),
        source,
    })?;

    let module = lua.create_table()?;
    module.raw_set("__name", name)?;
    module.raw_set("__file", file_name.as_str())?;
    module.raw_set("__values", values)?;
    module.raw_set("__order", order)?;
    module.raw_set("__env", env)?;
    cache.raw_set(name, module.clone())?;

    debug!(module = name, file = %file_name, "imported module");
    Ok(module)
}

/// Top-level definitions of an imported module, in first-definition order.
/// Names assigned `nil` after definition are skipped.
pub fn module_definitions<'lua>(module: &Table<'lua>) -> mlua::Result<Vec<(Value<'lua>, Value<'lua>)>> {
    let values: Table = module.raw_get("__values")?;
    let order: Table = module.raw_get("__order")?;

    let mut definitions = Vec::new();
    for key in order.sequence_values::<Value>() {
        let key = key?;
        let value: Value = values.raw_get(key.clone())?;
        if !matches!(value, Value::Nil) {
            definitions.push((key, value));
        }
    }
    Ok(definitions)
}

#[must_use]
pub fn module_name(module: &Table) -> Option<String> {
    module.raw_get("__name").ok().flatten()
}

/// Name of the module whose top-level code is running, innermost first.
pub fn importing_module(lua: &Lua) -> mlua::Result<Option<String>> {
    let Some(importing) = lua.named_registry_value::<Option<Table>>(IMPORTING_KEY)? else {
        return Ok(None);
    };
    match importing.raw_len() {
        0 => Ok(None),
        depth => importing.raw_get(depth),
    }
}

fn importing_stack<'lua>(lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
    if let Some(importing) = lua.named_registry_value::<Option<Table>>(IMPORTING_KEY)? {
        return Ok(importing);
    }
    let importing = lua.create_table()?;
    lua.set_named_registry_value(IMPORTING_KEY, importing.clone())?;
    Ok(importing)
}

fn module_cache<'lua>(lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
    if let Some(cache) = lua.named_registry_value::<Option<Table>>(MODULES_KEY)? {
        return Ok(cache);
    }
    let cache = lua.create_table()?;
    lua.set_named_registry_value(MODULES_KEY, cache.clone())?;
    Ok(cache)
}

fn namespace_factory<'lua>(lua: &'lua Lua) -> mlua::Result<Function<'lua>> {
    if let Some(factory) = lua.named_registry_value::<Option<Function>>(NAMESPACE_FACTORY_KEY)? {
        return Ok(factory);
    }
    let factory: Function = lua
        .load(NAMESPACE_FACTORY)
        .set_name("=kindling-namespace")
        .eval()?;
    lua.set_named_registry_value(NAMESPACE_FACTORY_KEY, factory.clone())?;
    Ok(factory)
}

fn locate(search_path: &[String], name: &str) -> Option<PathBuf> {
    let relative: PathBuf = name.split('.').collect();
    search_path
        .iter()
        .map(Path::new)
        .flat_map(|dir| {
            [
                dir.join(&relative).with_extension("lua"),
                dir.join(&relative).join("init.lua"),
            ]
        })
        .find(|candidate| candidate.is_file())
}
