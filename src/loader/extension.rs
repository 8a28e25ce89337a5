use std::fmt;
use std::sync::Arc;

use mlua::{AnyUserData, Lua, Table, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CreateError, HostError};
use crate::host::{HostObject, Parameter, PluginDescriptor, TypeHandle, TypeRegistry};
use crate::loader::resolve::resolve;
use crate::runtime::interop::LuaBacking;

/// Attribute on the Lua instance naming the plugin that produced it.
pub const PLUGIN_INFO_ATTRIBUTE: &str = "plugin_info";

/// An object created from a plugin class, implementing a host interface.
///
/// Holds the caller's strong reference to the host object; the Lua side of
/// the object lives until the last host reference is dropped.
pub struct Extension {
    id: Uuid,
    object: HostObject,
    plugin: PluginDescriptor,
    interface: TypeHandle,
    host: Arc<TypeRegistry>,
}

impl Extension {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn object(&self) -> &HostObject {
        &self.object
    }

    #[must_use]
    pub fn into_object(self) -> HostObject {
        self.object
    }

    /// The plugin this extension was created from.
    #[must_use]
    pub fn plugin(&self) -> &PluginDescriptor {
        &self.plugin
    }

    /// The interface this extension was requested for.
    #[must_use]
    pub fn interface(&self) -> TypeHandle {
        self.interface
    }

    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.object.strong_count()
    }

    /// Call a method declared by the extension's interface.
    pub fn call(
        &self,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, HostError> {
        if !self.host.methods(self.interface).iter().any(|m| m == method) {
            return Err(HostError::UnknownMethod {
                type_name: self
                    .host
                    .name(self.interface)
                    .unwrap_or_else(|| self.interface.to_string()),
                method: method.to_string(),
            });
        }
        self.object.invoke(method, args)
    }

    /// Read the plugin metadata back from the Lua instance.
    pub fn plugin_info(&self) -> Result<Option<PluginDescriptor>, HostError> {
        let Some(backing) = self.object.backing().as_any().downcast_ref::<LuaBacking>() else {
            return Ok(None);
        };
        backing.with_instance(|_, instance| {
            let info = match instance.get::<_, Value>(PLUGIN_INFO_ATTRIBUTE)? {
                Value::UserData(data) => {
                    let plugin = data.borrow::<PluginDescriptor>()?.clone();
                    Some(plugin)
                }
                _ => None,
            };
            Ok(info)
        })
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("id", &self.id)
            .field("plugin", &self.plugin.id())
            .field("interface", &self.interface)
            .field("object", &self.object)
            .finish()
    }
}

/// Resolve, construct and tag a new extension. The caller holds the
/// execution lock (`lua`) and has already looked up the plugin's module.
pub(crate) fn create<'lua>(
    lua: &'lua Lua,
    host: &Arc<TypeRegistry>,
    module: &Table<'lua>,
    plugin: &PluginDescriptor,
    interface: TypeHandle,
    params: &[Parameter],
) -> Result<Extension, CreateError> {
    let Some(resolved) = resolve(lua, host, module, interface)? else {
        return Err(CreateError::NoExtensionType {
            plugin: plugin.id().to_string(),
            interface,
        });
    };
    let class = resolved.name().to_string();

    let native = match resolved.native_type() {
        Ok(Some(ty)) if host.is_a(ty, interface) => ty,
        _ => return Err(CreateError::TypeMismatch { class, interface }),
    };
    drop(resolved);

    let object = host
        .construct(native, params)
        .map_err(|source| CreateError::ConstructionFailed {
            class: class.clone(),
            source,
        })?;

    // On failure `object` drops here, releasing the half-built instance.
    attach_plugin_info(lua, &object, plugin)
        .map_err(|source| CreateError::MetadataAttachFailed {
            class: class.clone(),
            source,
        })?;

    let extension = Extension {
        id: Uuid::new_v4(),
        object,
        plugin: plugin.clone(),
        interface,
        host: Arc::clone(host),
    };
    debug!(plugin = %plugin, class = %class, extension = %extension.id, "created extension");
    Ok(extension)
}

fn attach_plugin_info(lua: &Lua, object: &HostObject, plugin: &PluginDescriptor) -> mlua::Result<()> {
    let backing = object
        .backing()
        .as_any()
        .downcast_ref::<LuaBacking>()
        .ok_or_else(|| {
            mlua::Error::RuntimeError(format!("'{}' is not backed by a Lua instance", object.type_name()))
        })?;
    let instance = backing.instance(lua)?;
    let info: AnyUserData = lua.create_userdata(plugin.clone())?;
    instance.set(PLUGIN_INFO_ATTRIBUTE, info)
}
