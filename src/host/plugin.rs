use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct PluginInfo {
    id: String,
    module_dir: PathBuf,
    module_name: String,
}

/// Identifies a plugin to the loader.
///
/// Discovery and manifest parsing happen elsewhere; the loader only keys its
/// tables on the plugin id and attaches the descriptor to the extensions it
/// creates.
#[derive(Clone)]
pub struct PluginDescriptor {
    info: Arc<PluginInfo>,
}

impl PluginDescriptor {
    pub fn new(
        id: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        module_name: impl Into<String>,
    ) -> Self {
        Self {
            info: Arc::new(PluginInfo {
                id: id.into(),
                module_dir: module_dir.into(),
                module_name: module_name.into(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn module_dir(&self) -> &Path {
        &self.info.module_dir
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.info.module_name
    }
}

impl PartialEq for PluginDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for PluginDescriptor {}

impl Hash for PluginDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.id.hash(state);
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.info.id)
            .field("module", &self.info.module_name)
            .finish()
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info.id)
    }
}
