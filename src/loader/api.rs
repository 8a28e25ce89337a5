/// Loader backend API
use crate::error::{CreateError, InitError, LoadError};
use crate::host::{Parameter, PluginDescriptor, TypeHandle};
use crate::loader::extension::Extension;

/// A backend that loads plugins written for one runtime and turns their
/// classes into extensions.
///
/// Every method may be called from any host thread.
pub trait PluginLoader: Send + Sync {
    /// Bring up the runtime. Must succeed before anything else does.
    fn initialize(&self) -> Result<(), InitError>;

    /// Tear everything down. Safe to call more than once, and after a
    /// failed `initialize`.
    fn finalize(&self);

    /// Load a plugin's module. Loading a loaded plugin succeeds and does nothing.
    fn load(&self, plugin: &PluginDescriptor) -> Result<(), LoadError>;

    /// Unload a plugin. Unloading a plugin that is not loaded does nothing.
    fn unload(&self, plugin: &PluginDescriptor);

    fn is_loaded(&self, plugin: &PluginDescriptor) -> bool;

    /// Whether the plugin has a class implementing `interface`.
    fn provides_extension(&self, plugin: &PluginDescriptor, interface: TypeHandle) -> bool;

    /// Create an extension implementing `interface` from the plugin.
    fn create_extension(
        &self,
        plugin: &PluginDescriptor,
        interface: TypeHandle,
        params: &[Parameter],
    ) -> Result<Extension, CreateError>;

    /// Hint that now is a good time to free runtime memory.
    fn garbage_collect(&self);
}
