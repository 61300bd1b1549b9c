//! `plugins` command - list registered plugins.

use anyhow::Result;
use serde::Serialize;

use plugrun::config::{PluginSettings, NO_PLUGINS_ENV};
use plugrun::plugins::PluginRegistry;

#[derive(Debug, Serialize)]
struct PluginListing {
    disabled: bool,
    search_path: Vec<String>,
    plugins: Vec<PluginEntry>,
}

#[derive(Debug, Serialize)]
struct PluginEntry {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    usage: String,
    description: String,
    command: String,
    dir: String,
}

fn listing(registry: &PluginRegistry, settings: &PluginSettings) -> PluginListing {
    PluginListing {
        disabled: settings.disabled,
        search_path: settings
            .search_path
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        plugins: registry
            .plugins()
            .iter()
            .map(|p| PluginEntry {
                name: p.metadata.name.clone(),
                version: p.metadata.version.clone(),
                usage: p.metadata.short_help(),
                description: p.metadata.description.clone(),
                command: p.metadata.command.clone(),
                dir: p.dir.display().to_string(),
            })
            .collect(),
    }
}

pub(crate) fn cmd_plugins(
    registry: &PluginRegistry,
    settings: &PluginSettings,
    json: bool,
) -> Result<()> {
    let listing = listing(registry, settings);

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.disabled {
        println!("Plugins are disabled ({} is set).", NO_PLUGINS_ENV);
        return Ok(());
    }

    println!("Search path:");
    for dir in &listing.search_path {
        println!("  {}", dir);
    }
    println!();

    if listing.plugins.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    let width = listing
        .plugins
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0);
    for plugin in &listing.plugins {
        println!("  {:<width$}  {}", plugin.name, plugin.usage, width = width);
        println!("  {:<width$}  {}", "", plugin.dir, width = width);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugrun::plugins::{PluginDescriptor, PluginMetadata};
    use std::path::PathBuf;

    #[test]
    fn test_listing_json_shape() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginDescriptor::new(
            PluginMetadata {
                name: "hello".to_string(),
                version: Some("0.2.0".to_string()),
                usage: String::new(),
                description: "Greets people.".to_string(),
                command: "hello.sh".to_string(),
            },
            PathBuf::from("/plugins/hello"),
        ));
        let settings = PluginSettings {
            disabled: false,
            search_path: vec![PathBuf::from("/plugins")],
            timeout: None,
        };

        let value = serde_json::to_value(listing(&registry, &settings)).unwrap();
        assert_eq!(value["disabled"], false);
        assert_eq!(value["search_path"][0], "/plugins");
        assert_eq!(value["plugins"][0]["name"], "hello");
        assert_eq!(value["plugins"][0]["version"], "0.2.0");
        assert_eq!(value["plugins"][0]["usage"], "the \"hello\" plugin");
        assert_eq!(value["plugins"][0]["dir"], "/plugins/hello");
    }

    #[test]
    fn test_listing_omits_missing_version() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginDescriptor::new(
            PluginMetadata {
                name: "bare".to_string(),
                version: None,
                usage: "bare plugin".to_string(),
                description: String::new(),
                command: "bare".to_string(),
            },
            PathBuf::from("/plugins/bare"),
        ));

        let value =
            serde_json::to_value(listing(&registry, &PluginSettings::default())).unwrap();
        assert!(value["plugins"][0].get("version").is_none());
        assert_eq!(value["plugins"][0]["usage"], "bare plugin");
    }
}
