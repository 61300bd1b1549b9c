//! Configuration for Plugrun
//!
//! Plugin loading is configured entirely through environment variables.
//! Resolution goes through a lookup function so it can be exercised without
//! touching the process environment.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PlugrunError, Result};

/// Disables all plugin loading when set to a truthy value.
pub const NO_PLUGINS_ENV: &str = "PLUGRUN_NO_PLUGINS";

/// Plugin search path, split with the host path-list separator.
/// Also re-exported to plugins with the resolved value.
pub const PLUGINS_ENV: &str = "PLUGRUN_PLUGINS";

/// Optional per-invocation timeout in seconds.
pub const PLUGIN_TIMEOUT_ENV: &str = "PLUGRUN_PLUGIN_TIMEOUT";

/// Short name of the plugin being run.
pub const PLUGIN_NAME_ENV: &str = "PLUGRUN_PLUGIN_NAME";

/// Directory the plugin was loaded from.
pub const PLUGIN_DIR_ENV: &str = "PLUGRUN_PLUGIN_DIR";

/// Path of the dispatcher executable.
pub const BIN_ENV: &str = "PLUGRUN_BIN";

/// Resolved plugin settings for one program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Skip discovery and registration entirely.
    pub disabled: bool,

    /// Directories scanned for plugins, in order.
    pub search_path: Vec<PathBuf>,

    /// Kill a plugin that runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            search_path: vec![default_plugin_dir()],
            timeout: None,
        }
    }
}

impl PluginSettings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let disabled = lookup(NO_PLUGINS_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let search_path = match lookup(PLUGINS_ENV) {
            Some(raw) if !raw.trim().is_empty() => parse_search_path(&raw),
            _ => vec![default_plugin_dir()],
        };

        let timeout = match lookup(PLUGIN_TIMEOUT_ENV) {
            Some(raw) if !raw.trim().is_empty() => parse_timeout(&raw)?,
            _ => None,
        };

        Ok(Self {
            disabled,
            search_path,
            timeout,
        })
    }

    /// The search path joined back into a single environment value.
    pub fn search_path_string(&self) -> Result<OsString> {
        std::env::join_paths(&self.search_path)
            .map_err(|e| PlugrunError::Config(format!("Cannot export plugin search path: {}", e)))
    }
}

/// Default plugin directory: `~/.plugrun/plugins`.
pub fn default_plugin_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plugrun")
        .join("plugins")
}

/// Split a search path value using the host convention, dropping empty segments.
pub fn parse_search_path(raw: &str) -> Vec<PathBuf> {
    std::env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_timeout(raw: &str) -> Result<Option<Duration>> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        PlugrunError::Config(format!(
            "Invalid {} value '{}': expected a whole number of seconds",
            PLUGIN_TIMEOUT_ENV, raw
        ))
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
