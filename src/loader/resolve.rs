//! Finding the class in a plugin module that implements a host interface.

use mlua::{Lua, Table, Value};
use tracing::warn;

use crate::host::{TypeHandle, TypeRegistry};
use crate::runtime::{import, interop};

/// A class found to implement an interface. Borrowed from the runtime, so it
/// cannot outlive the execution lock it was resolved under.
pub struct ResolvedExtensionType<'lua> {
    class: Table<'lua>,
    name: String,
}

impl<'lua> ResolvedExtensionType<'lua> {
    #[must_use]
    pub fn class(&self) -> &Table<'lua> {
        &self.class
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host type the class was registered as.
    pub fn native_type(&self) -> mlua::Result<Option<TypeHandle>> {
        interop::native_type(&self.class)
    }
}

/// The first class in `module`, in definition order, that derives from the
/// Lua class wrapping `interface`.
///
/// If no Lua class wraps `interface` nothing can derive from it and the
/// answer is `None`. Classes whose hierarchy cannot be inspected are logged
/// and skipped. With several matching classes the first defined wins.
pub fn resolve<'lua>(
    lua: &'lua Lua,
    host: &TypeRegistry,
    module: &Table<'lua>,
    interface: TypeHandle,
) -> mlua::Result<Option<ResolvedExtensionType<'lua>>> {
    let wrapper = interop::wrap_type(lua, host, interface)?;
    let Some(base) = wrapper.raw_get::<_, Option<Table>>("class")? else {
        return Ok(None);
    };

    for (key, value) in import::module_definitions(module)? {
        if !interop::is_class(&value)? {
            continue;
        }
        let Value::Table(candidate) = value else {
            continue;
        };
        match interop::is_subclass(&candidate, &base) {
            Ok(true) => {
                let name = interop::class_name(&candidate);
                return Ok(Some(ResolvedExtensionType {
                    class: candidate,
                    name,
                }));
            }
            Ok(false) => {}
            Err(e) => {
                let key = match &key {
                    Value::String(s) => s.to_string_lossy().into_owned(),
                    other => other.type_name().to_string(),
                };
                warn!(definition = %key, %interface, "skipping class: {}", e);
            }
        }
    }
    Ok(None)
}
