//! Error types for the loader bridge.
//!
//! Errors are scoped the way failures are: [`InitError`] disables the whole
//! extension mechanism, [`LoadError`] disables one plugin and [`CreateError`]
//! fails one extension request. Hook failures are never surfaced at all.

use std::path::PathBuf;

use crate::host::TypeHandle;
use crate::loader::Phase;
use crate::runtime::version::RuntimeVersion;

/// Failure to bring up the embedded runtime and the loader internals.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("loader cannot be initialized from the {0:?} phase")]
    InvalidPhase(Phase),

    #[error("attempting to mix incompatible Lua versions: built against {expected}, running {found}")]
    VersionMismatch {
        expected: RuntimeVersion,
        found: String,
    },

    #[error("failed to add the module path '{}'", path.display())]
    SearchPath {
        path: PathBuf,
        #[source]
        source: PathError,
    },

    #[error("interoperability layer initialization failed")]
    Interop(#[source] mlua::Error),

    #[error("failed to install localization support: {0}")]
    Localization(String),

    #[error("localization support is not installed but the loader internals require it")]
    MissingLocalization,

    #[error("failed to run internal loader code")]
    Bootstrap(#[source] mlua::Error),

    #[error("failed to find internal loader hooks")]
    MissingHooks,

    #[error("embedded runtime error during initialization")]
    Runtime(#[from] mlua::Error),
}

/// Failure to register a directory on the runtime search path.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("module path is empty")]
    Empty,

    #[error("module path '{}' is not valid UTF-8", .0.display())]
    NotUtf8(PathBuf),

    #[error("runtime rejected the search path update")]
    Runtime(#[from] mlua::Error),
}

/// Failure to import a plugin module.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("'{0}' is not a valid module name")]
    InvalidName(String),

    #[error("no module named '{name}' on the search path ({} entries)", searched.len())]
    NotFound { name: String, searched: Vec<String> },

    #[error("failed to read module source '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module '{name}' raised an error while executing")]
    Execution {
        name: String,
        #[source]
        source: mlua::Error,
    },

    #[error("embedded runtime error during import")]
    Runtime(#[from] mlua::Error),
}

/// Failure to load one plugin. Other plugins are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("loader is not initialized")]
    NotInitialized,

    #[error("failed to add module path '{}' for plugin '{plugin}'", module_dir.display())]
    Path {
        plugin: String,
        module_dir: PathBuf,
        #[source]
        source: PathError,
    },

    #[error("failed to import module '{module}' for plugin '{plugin}'")]
    Import {
        plugin: String,
        module: String,
        #[source]
        source: ImportError,
    },

    #[error("embedded runtime error while loading plugin")]
    Runtime(#[from] mlua::Error),
}

/// Failure to create one extension.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("loader is not initialized")]
    NotInitialized,

    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),

    /// The plugin does not implement the interface. A normal negative answer.
    #[error("plugin '{plugin}' provides no extension for {interface}")]
    NoExtensionType { plugin: String, interface: TypeHandle },

    #[error("class '{class}' does not map to a host type implementing {interface}")]
    TypeMismatch { class: String, interface: TypeHandle },

    #[error("failed to construct an instance of '{class}'")]
    ConstructionFailed {
        class: String,
        #[source]
        source: HostError,
    },

    #[error("failed to set 'plugin_info' for '{class}'")]
    MetadataAttachFailed {
        class: String,
        #[source]
        source: mlua::Error,
    },

    #[error("embedded runtime error while creating extension")]
    Runtime(#[from] mlua::Error),
}

impl CreateError {
    /// Whether this is the "plugin does not implement the interface" answer
    /// rather than an actual failure.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoExtensionType { .. })
    }
}

/// Failures inside the host object system.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("unknown host type {0}")]
    UnknownType(TypeHandle),

    #[error("a host type named '{0}' is already registered")]
    DuplicateType(String),

    #[error("'{0}' is an interface and cannot be instantiated")]
    NotInstantiable(String),

    #[error("'{type_name}' declares no method '{method}'")]
    UnknownMethod { type_name: String, method: String },

    #[error("construction failed: {0}")]
    Construction(String),

    #[error("method '{method}' failed: {message}")]
    Invocation { method: String, message: String },

    #[error("the embedded runtime is not running")]
    RuntimeUnavailable,

    #[error("embedded runtime error")]
    Runtime(#[from] mlua::Error),
}

/// Render an error followed by its chain of sources.
#[must_use]
pub fn report(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
