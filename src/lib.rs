//! Kindling - Lua plugins for a native host object system
//!
//! This library embeds a Lua runtime behind a process-wide execution lock
//! and lets a host application load plugins written in Lua, whose classes
//! become extensions implementing host-defined interfaces.
//!
//! # Modules
//!
//! - [`runtime`]: The embedded runtime, its execution lock, module import and the `host` Lua API
//! - [`loader`]: Plugin loading, extension creation, lifecycle hooks and collector coordination
//! - [`host`]: Host types, objects, plugin descriptors and idle scheduling
//! - [`config`]: Configuration management and serialization
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod runtime;

pub use config::LoaderConfig;
pub use error::{CreateError, HostError, ImportError, InitError, LoadError, PathError};
pub use loader::{Extension, LuaPluginLoader, Phase, PluginLoader};
pub use runtime::{EmbeddedRuntime, ExecutionToken, LockMode};
