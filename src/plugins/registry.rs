//! Plugin registry for Plugrun
//!
//! Maps subcommand names to the plugin that serves them. The CLI looks the
//! invoked subcommand up here at dispatch time instead of binding one
//! handler per plugin.

use std::collections::HashMap;

use tracing::{info, warn};

use super::types::PluginDescriptor;

/// Registered plugins, indexed by subcommand name.
///
/// Listing order follows registration order. Registering a name twice
/// replaces the earlier plugin in place, so the last registration wins.
///
/// # Example
///
/// ```rust
/// use std::path::PathBuf;
/// use plugrun::plugins::{PluginDescriptor, PluginMetadata, PluginRegistry};
///
/// let mut registry = PluginRegistry::with_reserved(["version"]);
/// let plugin = PluginDescriptor::new(
///     PluginMetadata {
///         name: "hello".to_string(),
///         version: None,
///         usage: String::new(),
///         description: String::new(),
///         command: "hello.sh".to_string(),
///     },
///     PathBuf::from("/plugins/hello"),
/// );
///
/// assert!(registry.register(plugin));
/// assert!(registry.get("hello").is_some());
/// ```
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
    by_name: HashMap<String, usize>,
    reserved: Vec<String>,
}

impl PluginRegistry {
    /// Create an empty registry with no reserved names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that refuses the given built-in names.
    pub fn with_reserved<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Register a plugin under its manifest name.
    ///
    /// Returns `false` if the name is reserved by a built-in command.
    pub fn register(&mut self, plugin: PluginDescriptor) -> bool {
        let name = plugin.name().to_string();

        if self.reserved.iter().any(|r| r == &name) {
            warn!(
                plugin = %name,
                dir = %plugin.dir.display(),
                "Plugin name collides with a built-in command, not registered"
            );
            return false;
        }

        match self.by_name.get(&name) {
            Some(&idx) => {
                warn!(
                    plugin = %name,
                    replaced = %self.plugins[idx].dir.display(),
                    by = %plugin.dir.display(),
                    "Duplicate plugin name, later registration wins"
                );
                self.plugins[idx] = plugin;
            }
            None => {
                info!(plugin = %name, dir = %plugin.dir.display(), "Registered plugin");
                self.by_name.insert(name, self.plugins.len());
                self.plugins.push(plugin);
            }
        }
        true
    }

    /// Register every plugin in order. Returns how many were accepted.
    pub fn register_all<I>(&mut self, plugins: I) -> usize
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        plugins
            .into_iter()
            .map(|p| self.register(p))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Look a plugin up by subcommand name.
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.by_name.get(name).map(|&idx| &self.plugins[idx])
    }

    /// Whether a subcommand name belongs to a plugin.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
