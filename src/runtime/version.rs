use std::fmt;
use std::str::FromStr;

use mlua::Lua;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::InitError;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Lua (\d+)\.(\d+)(?:\.\d+)?$").expect("valid version regex"));

/// A Lua release series. Lua breaks its ABI between series, so `5.4` is the
/// compatibility unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
}

/// The series the vendored Lua was built from.
pub const BUILT_AGAINST: RuntimeVersion = RuntimeVersion { major: 5, minor: 4 };

impl RuntimeVersion {
    #[must_use]
    pub fn is_compatible_with(self, other: RuntimeVersion) -> bool {
        self == other
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lua {}.{}", self.major, self.minor)
    }
}

impl FromStr for RuntimeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(s.trim())
            .ok_or_else(|| format!("unrecognized version string '{s}'"))?;
        let major = caps[1].parse().map_err(|e| format!("bad major version: {e}"))?;
        let minor = caps[2].parse().map_err(|e| format!("bad minor version: {e}"))?;
        Ok(Self { major, minor })
    }
}

/// The version string the running runtime reports through `_VERSION`.
pub fn reported_version(lua: &Lua) -> mlua::Result<Option<String>> {
    lua.globals().raw_get::<_, Option<String>>("_VERSION")
}

/// Refuse to run against a runtime from another release series. Reads
/// only; the runtime is left exactly as found.
pub fn check(lua: &Lua) -> Result<RuntimeVersion, InitError> {
    let reported = reported_version(lua)?;
    let found = reported.unwrap_or_else(|| "unknown".to_string());
    match found.parse::<RuntimeVersion>() {
        Ok(version) if version.is_compatible_with(BUILT_AGAINST) => Ok(version),
        _ => Err(InitError::VersionMismatch {
            expected: BUILT_AGAINST,
            found,
        }),
    }
}
