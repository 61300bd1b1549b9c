//! Plugin discovery and loading for Plugrun
//!
//! This module handles scanning plugin directories, loading and parsing
//! `plugin.json` manifests, and validating manifest contents.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{PlugrunError, Result};

use super::types::{PluginDescriptor, PluginMetadata};

/// Manifest file expected inside every plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").expect("name pattern is valid")
});

/// Outcome of scanning a whole search path.
///
/// Scanning stops at the first directory that fails. Whatever was found
/// before that point is kept in `plugins` next to the `error`, and the
/// caller decides whether partial results are usable.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Plugins found, in search path order.
    pub plugins: Vec<PluginDescriptor>,

    /// The error that stopped the scan, if any.
    pub error: Option<PlugrunError>,
}

impl Discovery {
    /// Whether the whole search path was scanned without error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// All-or-nothing view: the error wins over partial results.
    pub fn into_result(self) -> Result<Vec<PluginDescriptor>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.plugins),
        }
    }
}

/// Discover plugins across every directory of a search path.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use plugrun::plugins::find_all;
///
/// let discovery = find_all(&[PathBuf::from("/home/user/.plugrun/plugins")]);
/// for plugin in &discovery.plugins {
///     println!("Found plugin: {}", plugin.name());
/// }
/// if let Some(err) = &discovery.error {
///     eprintln!("discovery stopped early: {}", err);
/// }
/// ```
pub fn find_all(search_path: &[PathBuf]) -> Discovery {
    let mut discovery = Discovery::default();

    for dir in search_path {
        match load_all(dir) {
            Ok(found) => discovery.plugins.extend(found),
            Err(e) => {
                discovery.error = Some(e);
                break;
            }
        }
    }

    info!(
        plugins = discovery.plugins.len(),
        complete = discovery.is_complete(),
        "Plugin discovery finished"
    );
    discovery
}

/// Load every plugin in one directory.
///
/// Each subdirectory holding a `plugin.json` is one plugin. Subdirectories
/// without a manifest and plain files are skipped. Results are ordered by
/// plugin directory path.
///
/// # Errors
/// - `PlugrunError::Discovery` if the directory is missing or unreadable
/// - `PlugrunError::Discovery` if any manifest is unreadable, malformed, or invalid
pub fn load_all(dir: &Path) -> Result<Vec<PluginDescriptor>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PlugrunError::discovery(dir, format!("Failed to read plugin directory: {}", e))
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            PlugrunError::discovery(dir, format!("Failed to read directory entry: {}", e))
        })?;

        let entry_path = entry.path();
        if !entry_path.is_dir() {
            continue;
        }
        if !entry_path.join(MANIFEST_FILE).is_file() {
            debug!(dir = %entry_path.display(), "No plugin.json, skipping");
            continue;
        }
        candidates.push(entry_path);
    }
    candidates.sort();

    let mut plugins = Vec::with_capacity(candidates.len());
    for path in candidates {
        let plugin = load_plugin(&path)?;
        debug!(
            plugin = %plugin.name(),
            dir = %plugin.dir.display(),
            "Discovered plugin"
        );
        plugins.push(plugin);
    }

    Ok(plugins)
}

/// Load a single plugin from its directory.
///
/// # Errors
/// `PlugrunError::Discovery` if `plugin.json` is missing, unreadable,
/// not valid JSON, or fails `validate_metadata`.
pub fn load_plugin(dir: &Path) -> Result<PluginDescriptor> {
    let manifest_path = dir.join(MANIFEST_FILE);

    let content = fs::read_to_string(&manifest_path)
        .map_err(|e| PlugrunError::discovery(&manifest_path, format!("Failed to read: {}", e)))?;

    let metadata: PluginMetadata = serde_json::from_str(&content).map_err(|e| {
        PlugrunError::discovery(&manifest_path, format!("Malformed manifest: {}", e))
    })?;

    validate_metadata(&metadata).map_err(|msg| PlugrunError::discovery(&manifest_path, msg))?;

    let dir = fs::canonicalize(dir)
        .map_err(|e| PlugrunError::discovery(dir, format!("Failed to resolve path: {}", e)))?;

    Ok(PluginDescriptor::new(metadata, dir))
}

/// Validate a manifest.
///
/// - Name must be 1-64 characters: alphanumeric first, then alphanumerics,
///   hyphens and underscores
/// - Command must not be blank
pub fn validate_metadata(metadata: &PluginMetadata) -> std::result::Result<(), String> {
    if !NAME_RE.is_match(&metadata.name) {
        return Err(format!(
            "Invalid plugin name '{}': must be 1-64 alphanumeric characters, hyphens or underscores, starting with alphanumeric",
            metadata.name
        ));
    }

    if metadata.command.trim().is_empty() {
        return Err(format!("Plugin '{}' has an empty command", metadata.name));
    }

    Ok(())
}
