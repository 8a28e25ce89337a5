//! The host side of the bridge: native types, objects, plugin descriptors
//! and the event loop the loader schedules deferred work on.

pub mod object;
pub mod plugin;
pub mod scheduler;
pub mod types;

pub use object::{HostObject, ObjectBacking, WeakHostObject};
pub use plugin::PluginDescriptor;
pub use scheduler::{IdleScheduler, IdleTask, MainLoop, SourceId, TokioIdleScheduler};
pub use types::{Constructor, Parameter, TypeHandle, TypeKind, TypeRegistry};
