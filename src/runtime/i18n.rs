//! Translation support for strings coming out of Lua code.
//!
//! Installs `_` and `gettext` into the runtime globals. Catalogs are YAML
//! maps from message id to translation, stored as
//! `<locale_dir>/<language>/<domain>.yaml`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use mlua::Lua;
use tracing::{debug, warn};

use crate::config::LocalizationConfig;
use crate::error::InitError;

/// Install the translation functions. A missing catalog means strings are
/// returned untranslated; an unreadable one is an error.
pub fn install(lua: &Lua, config: &LocalizationConfig) -> Result<(), InitError> {
    if !config.enabled {
        warn!("localization support disabled");
        return Ok(());
    }

    let catalog = Arc::new(load_catalog(config)?);
    let gettext = lua.create_function(move |_, msgid: String| {
        Ok(catalog.get(&msgid).cloned().unwrap_or(msgid))
    })?;

    let globals = lua.globals();
    globals.set("_", gettext.clone())?;
    globals.set("gettext", gettext)?;
    Ok(())
}

/// Whether the translation function is available to Lua code.
pub fn is_installed(lua: &Lua) -> mlua::Result<bool> {
    Ok(lua.globals().get::<_, Option<mlua::Function>>("_")?.is_some())
}

fn load_catalog(config: &LocalizationConfig) -> Result<HashMap<String, String>, InitError> {
    for language in candidate_languages(config.language.as_deref()) {
        let path = catalog_path(config, &language);
        if !path.is_file() {
            continue;
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| InitError::Localization(format!("{}: {e}", path.display())))?;
        let catalog: HashMap<String, String> = serde_yaml::from_str(&contents)
            .map_err(|e| InitError::Localization(format!("{}: {e}", path.display())))?;
        debug!(catalog = %path.display(), messages = catalog.len(), "loaded translation catalog");
        return Ok(catalog);
    }
    debug!(domain = %config.domain, "no translation catalog found, using message ids");
    Ok(HashMap::new())
}

fn catalog_path(config: &LocalizationConfig, language: &str) -> PathBuf {
    config
        .locale_dir
        .join(language)
        .join(format!("{}.yaml", config.domain))
}

/// Languages to try, most specific first: `de_DE.UTF-8` yields `de_DE`, `de`.
fn candidate_languages(explicit: Option<&str>) -> Vec<String> {
    let raw = explicit.map(str::to_string).or_else(|| {
        ["LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
    });
    let Some(raw) = raw else {
        return Vec::new();
    };

    let mut languages = Vec::new();
    for entry in raw.split(':') {
        let locale = entry
            .split(['.', '@'])
            .next()
            .unwrap_or_default()
            .trim();
        if locale.is_empty() || locale == "C" || locale == "POSIX" {
            continue;
        }
        let locale = locale.to_string();
        if let Some((language, _)) = locale.split_once('_') {
            let language = language.to_string();
            if !languages.contains(&locale) {
                languages.push(locale);
            }
            if !languages.contains(&language) {
                languages.push(language);
            }
        } else if !languages.contains(&locale) {
            languages.push(locale);
        }
    }
    languages
}
