//! Interoperability between host types and Lua classes.
//!
//! Installs the `host` global:
//!
//! - `host.types.<Name>` wraps a host type as a Lua class (cached per type)
//! - `host.class(name, parent, ...)` declares a Lua class and registers it
//!   as a host type whose instances are Lua tables. Classes declared while a
//!   module is being imported are registered as `module+name`, and
//!   re-running the module redefines them
//! - `host.wrap(name)` returns the type wrapper, whose `class` field is the
//!   wrapped Lua class or nil
//! - `host.log(level, message)` forwards to `tracing`
//!
//! A class is a table marked `__class = true` with `__name`, `__parents`
//! and, once registered with the host, `__native`. Callbacks installed here
//! hold the runtime weakly and always re-enter through the execution lock,
//! so host threads may construct and call Lua-backed objects at any time.

use std::any::Any;
use std::sync::{Arc, Weak};

use mlua::{
    AnyUserData, Function, Lua, LuaSerdeExt, MetaMethod, MultiValue, RegistryKey,
    SerializeOptions, Table, UserData, UserDataFields, UserDataMethods, Value, Variadic,
};
use tracing::{debug, error, info, trace, warn};

use crate::error::HostError;
use crate::host::{
    Constructor, ObjectBacking, Parameter, PluginDescriptor, TypeHandle, TypeKind, TypeRegistry,
};
use crate::runtime::{import, EmbeddedRuntime};

const WRAPPERS_KEY: &str = "kindling.wrappers";
const MAX_CLASS_DEPTH: usize = 64;

impl UserData for PluginDescriptor {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.id().to_string()));
        fields.add_field_method_get("module_name", |_, this| Ok(this.module_name().to_string()));
        fields.add_field_method_get("module_dir", |_, this| {
            Ok(this.module_dir().display().to_string())
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("PluginInfo({})", this.id()))
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<PluginDescriptor>()
                .map(|other| *other == *this)
                .unwrap_or(false))
        });
    }
}

/// Install the `host` table into the runtime globals.
pub fn install(lua: &Lua, host: Arc<TypeRegistry>, runtime: Weak<EmbeddedRuntime>) -> mlua::Result<()> {
    if lua.named_registry_value::<Option<Table>>(WRAPPERS_KEY)?.is_none() {
        lua.set_named_registry_value(WRAPPERS_KEY, lua.create_table()?)?;
    }

    let api = lua.create_table()?;

    let types = lua.create_table()?;
    let types_meta = lua.create_table()?;
    let lookup_host = Arc::clone(&host);
    types_meta.raw_set(
        "__index",
        lua.create_function(move |lua, (_, name): (Table, String)| {
            let Some(ty) = lookup_host.lookup(&name) else {
                return Ok(Value::Nil);
            };
            Ok(Value::Table(host_class(lua, &lookup_host, ty)?))
        })?,
    )?;
    types.set_metatable(Some(types_meta));
    api.raw_set("types", types)?;

    let class_host = Arc::clone(&host);
    api.raw_set(
        "class",
        lua.create_function(move |lua, (name, parents): (String, Variadic<Table>)| {
            define_class(lua, &class_host, &runtime, name, parents)
        })?,
    )?;

    let wrap_host = Arc::clone(&host);
    api.raw_set(
        "wrap",
        lua.create_function(move |lua, name: String| match wrap_host.lookup(&name) {
            Some(ty) => wrap_type(lua, &wrap_host, ty).map(Some),
            None => Ok(None),
        })?,
    )?;

    api.raw_set(
        "log",
        lua.create_function(|_, (level, message): (String, String)| {
            match level.as_str() {
                "error" => error!(target: "kindling::lua", "{}", message),
                "warn" | "warning" => warn!(target: "kindling::lua", "{}", message),
                "debug" => debug!(target: "kindling::lua", "{}", message),
                "trace" => trace!(target: "kindling::lua", "{}", message),
                _ => info!(target: "kindling::lua", "{}", message),
            }
            Ok(())
        })?,
    )?;

    lua.globals().set("host", api)?;
    debug!("installed host interoperability layer");
    Ok(())
}

/// Whether the interoperability layer is present in this runtime.
pub fn is_installed(lua: &Lua) -> mlua::Result<bool> {
    Ok(lua.globals().get::<_, Option<Table>>("host")?.is_some())
}

/// Interpreter-visible wrapper of a host type. Its `class` field is the Lua
/// class wrapping that type, absent when no Lua class exists for it.
pub fn wrap_type<'lua>(lua: &'lua Lua, host: &TypeRegistry, ty: TypeHandle) -> mlua::Result<Table<'lua>> {
    let wrapper = lua.create_table()?;
    wrapper.raw_set("handle", ty.raw())?;
    if let Some(name) = host.name(ty) {
        wrapper.raw_set("name", name)?;
    }
    if let Some(class) = wrapped_class(lua, ty)? {
        wrapper.raw_set("class", class)?;
    }
    Ok(wrapper)
}

/// The Lua class wrapping `ty`, if one was created.
pub fn wrapped_class<'lua>(lua: &'lua Lua, ty: TypeHandle) -> mlua::Result<Option<Table<'lua>>> {
    let Some(cache) = lua.named_registry_value::<Option<Table>>(WRAPPERS_KEY)? else {
        return Ok(None);
    };
    cache.raw_get(ty.raw())
}

/// Whether `value` is a class table.
pub fn is_class(value: &Value) -> mlua::Result<bool> {
    match value {
        Value::Table(table) => Ok(matches!(table.raw_get::<_, Value>("__class")?, Value::Boolean(true))),
        _ => Ok(false),
    }
}

#[must_use]
pub fn class_name(class: &Table) -> String {
    class
        .raw_get::<_, Option<String>>("__name")
        .ok()
        .flatten()
        .unwrap_or_else(|| "<anonymous>".to_string())
}

/// The host type a class was registered as, if any.
pub fn native_type(class: &Table) -> mlua::Result<Option<TypeHandle>> {
    Ok(class
        .raw_get::<_, Option<u32>>("__native")?
        .map(TypeHandle::from_raw))
}

/// Whether `candidate` derives from `base`. A class is not its own subclass.
///
/// Errors on malformed hierarchies: a non-table `__parents`, non-table
/// parents, or cycles.
pub fn is_subclass(candidate: &Table, base: &Table) -> mlua::Result<bool> {
    if candidate == base {
        return Ok(false);
    }
    inherits(candidate, base, 0)
}

fn inherits(class: &Table, base: &Table, depth: usize) -> mlua::Result<bool> {
    if depth > MAX_CLASS_DEPTH {
        return Err(mlua::Error::RuntimeError(format!(
            "class hierarchy of '{}' is too deep or cyclic",
            class_name(class)
        )));
    }
    let parents = match class.raw_get::<_, Value>("__parents")? {
        Value::Nil => return Ok(false),
        Value::Table(parents) => parents,
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "__parents of '{}' must be a table, found {}",
                class_name(class),
                other.type_name()
            )))
        }
    };
    for parent in parents.sequence_values::<Value>() {
        let parent = match parent? {
            Value::Table(parent) => parent,
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "parent of '{}' is a {}, not a class",
                    class_name(class),
                    other.type_name()
                )))
            }
        };
        if parent == *base || inherits(&parent, base, depth + 1)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Convert a JSON value for Lua. `null` becomes `nil`.
pub fn to_lua<'lua>(lua: &'lua Lua, value: &serde_json::Value) -> mlua::Result<Value<'lua>> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

pub fn from_lua<'lua>(lua: &'lua Lua, value: Value<'lua>) -> mlua::Result<serde_json::Value> {
    lua.from_value(value)
}

fn cache_class(lua: &Lua, ty: TypeHandle, class: &Table) -> mlua::Result<()> {
    let cache: Table = lua.named_registry_value(WRAPPERS_KEY)?;
    cache.raw_set(ty.raw(), class.clone())
}

fn new_class<'lua>(lua: &'lua Lua, name: &str, parents: Table<'lua>) -> mlua::Result<Table<'lua>> {
    let class = lua.create_table()?;
    class.raw_set("__class", true)?;
    class.raw_set("__name", name)?;
    class.raw_set("__parents", parents)?;
    class.raw_set("__index", class.clone())?;

    // Members missing on the class are looked up on its parents, in order.
    let meta = lua.create_table()?;
    meta.raw_set(
        "__index",
        lua.create_function(|_, (class, key): (Table, Value)| {
            let parents = match class.raw_get::<_, Value>("__parents")? {
                Value::Table(parents) => parents,
                _ => return Ok(Value::Nil),
            };
            for parent in parents.sequence_values::<Table>() {
                let value: Value = parent?.get(key.clone())?;
                if !matches!(value, Value::Nil) {
                    return Ok(value);
                }
            }
            Ok(Value::Nil)
        })?,
    )?;
    class.set_metatable(Some(meta));
    Ok(class)
}

fn host_class<'lua>(lua: &'lua Lua, host: &TypeRegistry, ty: TypeHandle) -> mlua::Result<Table<'lua>> {
    if let Some(class) = wrapped_class(lua, ty)? {
        return Ok(class);
    }
    let name = host
        .name(ty)
        .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown host type {ty}")))?;
    let class = new_class(lua, &name, lua.create_table()?)?;
    class.raw_set("__native", ty.raw())?;
    class.raw_set("__interface", host.kind(ty) == Some(TypeKind::Interface))?;
    cache_class(lua, ty, &class)?;
    Ok(class)
}

fn define_class<'lua>(
    lua: &'lua Lua,
    host: &TypeRegistry,
    runtime: &Weak<EmbeddedRuntime>,
    name: String,
    parents: Variadic<Table<'lua>>,
) -> mlua::Result<Table<'lua>> {
    let mut native_parents = Vec::with_capacity(parents.len());
    for parent in parents.iter() {
        match native_type(parent)? {
            Some(ty) => native_parents.push(ty),
            None => {
                return Err(mlua::Error::RuntimeError(format!(
                    "class '{name}': parent '{}' is not a host type",
                    class_name(parent)
                )))
            }
        }
    }

    let type_name = match import::importing_module(lua)? {
        Some(module) => format!("{module}+{name}"),
        None => name.clone(),
    };
    let class = new_class(lua, &name, lua.create_sequence_from(parents.iter().cloned())?)?;
    class.raw_set("__type_name", type_name.as_str())?;
    let constructor = LuaClassConstructor {
        runtime: runtime.clone(),
        class: lua.create_registry_value(class.clone())?,
        name: type_name.clone(),
    };
    let ty = host
        .define_type(&type_name, &native_parents, Arc::new(constructor))
        .map_err(mlua::Error::external)?;
    class.raw_set("__native", ty.raw())?;
    cache_class(lua, ty, &class)?;

    debug!(class = %type_name, %ty, parents = native_parents.len(), "registered Lua class");
    Ok(class)
}

/// Instantiates a Lua class on behalf of the host type registry.
struct LuaClassConstructor {
    runtime: Weak<EmbeddedRuntime>,
    class: RegistryKey,
    name: String,
}

impl LuaClassConstructor {
    fn instantiate<'lua>(&self, lua: &'lua Lua, params: &[Parameter]) -> mlua::Result<Table<'lua>> {
        let class: Table = lua.registry_value(&self.class)?;
        let props = lua.create_table()?;
        for param in params {
            props.set(param.name.as_str(), to_lua(lua, &param.value)?)?;
        }

        let instance = lua.create_table()?;
        instance.set_metatable(Some(class.clone()));
        if let Some(init) = class.get::<_, Option<Function>>("init")? {
            init.call::<_, ()>((instance.clone(), props))?;
        }
        Ok(instance)
    }
}

impl Constructor for LuaClassConstructor {
    fn construct(
        &self,
        _ty: TypeHandle,
        params: &[Parameter],
    ) -> Result<Box<dyn ObjectBacking>, HostError> {
        let runtime = self.runtime.upgrade().ok_or(HostError::RuntimeUnavailable)?;
        let token = runtime.acquire();
        let Some(lua) = token.lua() else {
            return Err(HostError::RuntimeUnavailable);
        };

        let instance = self
            .instantiate(&lua, params)
            .map_err(|e| HostError::Construction(format!("{}: {e}", self.name)))?;
        let key = lua.create_registry_value(instance)?;
        let backing = LuaBacking {
            runtime: Arc::downgrade(&runtime),
            instance: Some(key),
            class_name: self.name.clone(),
        };
        Ok(Box::new(backing))
    }
}

/// Host-side half of a Lua-backed object: one registry reference to the Lua
/// instance, released under the execution lock when the object dies.
pub struct LuaBacking {
    runtime: Weak<EmbeddedRuntime>,
    instance: Option<RegistryKey>,
    class_name: String,
}

impl LuaBacking {
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The Lua instance. Having `lua` in hand means the lock is held.
    pub fn instance<'lua>(&self, lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
        match &self.instance {
            Some(key) => lua.registry_value(key),
            None => Err(mlua::Error::RuntimeError(format!(
                "instance of '{}' was already released",
                self.class_name
            ))),
        }
    }

    /// Run `f` on the Lua instance under the execution lock.
    pub fn with_instance<R>(
        &self,
        f: impl for<'lua> FnOnce(&'lua Lua, Table<'lua>) -> mlua::Result<R>,
    ) -> Result<R, HostError> {
        let runtime = self.runtime.upgrade().ok_or(HostError::RuntimeUnavailable)?;
        let token = runtime.acquire();
        let Some(lua) = token.lua() else {
            return Err(HostError::RuntimeUnavailable);
        };
        let key = self.instance.as_ref().ok_or(HostError::RuntimeUnavailable)?;
        let instance: Table = lua.registry_value(key)?;
        let result = f(&*lua, instance)?;
        Ok(result)
    }
}

impl ObjectBacking for LuaBacking {
    fn invoke(
        &self,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, HostError> {
        let class_name = &self.class_name;
        self.with_instance(|lua, instance| {
            let function = match instance.get::<_, Value>(method)? {
                Value::Function(function) => function,
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "'{class_name}' has no method '{method}' (found {})",
                        other.type_name()
                    )))
                }
            };
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(Value::Table(instance));
            for arg in args {
                call_args.push(to_lua(lua, arg)?);
            }
            let result: Value = function.call(MultiValue::from_vec(call_args))?;
            from_lua(lua, result)
        })
        .map_err(|e| match e {
            HostError::Runtime(err) => HostError::Invocation {
                method: method.to_string(),
                message: err.to_string(),
            },
            other => other,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for LuaBacking {
    fn drop(&mut self) {
        let Some(key) = self.instance.take() else {
            return;
        };
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let token = runtime.acquire();
        let Some(lua) = token.lua() else {
            return;
        };
        if let Err(e) = lua.remove_registry_value(key) {
            debug!(class = %self.class_name, "instance outlived its runtime: {}", e);
        }
    }
}
