use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Program name reported to Lua as `arg[0]`; defaults to the executable name
    #[serde(default)]
    pub program_name: Option<String>,

    /// Directory holding the loader's own Lua support modules
    #[serde(default = "default_support_dir")]
    pub support_dir: PathBuf,

    /// Strip process-control functions when the loader owns the runtime
    #[serde(default = "default_true")]
    pub sandbox: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Catalog file name, without extension
    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default = "default_locale_dir")]
    pub locale_dir: PathBuf,

    /// Overrides the language taken from the environment
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Upper bound on collector passes in one full sweep
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_support_dir() -> PathBuf {
    PathBuf::from(option_env!("KINDLING_SUPPORT_DIR").unwrap_or("/usr/local/lib/kindling/lua"))
}

fn default_domain() -> String {
    "kindling".to_string()
}

fn default_locale_dir() -> PathBuf {
    PathBuf::from(option_env!("KINDLING_LOCALE_DIR").unwrap_or("/usr/local/share/kindling/locale"))
}

fn default_max_passes() -> usize {
    32
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program_name: None,
            support_dir: default_support_dir(),
            sandbox: true,
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            domain: default_domain(),
            locale_dir: default_locale_dir(),
            language: None,
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
        }
    }
}

impl RuntimeConfig {
    /// The configured program name, or the file name of the running executable
    #[must_use]
    pub fn resolved_program_name(&self) -> String {
        self.program_name.clone().unwrap_or_else(|| {
            std::env::args()
                .next()
                .map(PathBuf::from)
                .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
                .unwrap_or_default()
        })
    }
}

impl LoaderConfig {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        let config: LoaderConfig = serde_yaml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;

        Ok(home.join(".kindling").join("loader.yaml"))
    }
}
