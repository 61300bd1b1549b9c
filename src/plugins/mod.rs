//! Plugin system for Plugrun
//!
//! External executables are discovered from a search path of directories
//! and exposed as subcommands. Each plugin is a directory containing a
//! `plugin.json` manifest and whatever files its entry point needs.
//!
//! # Architecture
//!
//! - **types**: Manifest, descriptor and prepared invocation
//! - **loader**: Directory scanning and manifest validation
//! - **registry**: Subcommand name to plugin mapping
//! - **dispatch**: Spawning the plugin process and translating its outcome
//!
//! # Plugin Directory Structure
//!
//! ```text
//! ~/.plugrun/plugins/
//! ├── hello/
//! │   ├── plugin.json
//! │   └── hello.sh
//! └── deploy/
//!     ├── plugin.json
//!     └── bin/
//!         └── deploy
//! ```
//!
//! # Example plugin.json
//!
//! ```json
//! {
//!   "name": "hello",
//!   "usage": "print a greeting",
//!   "description": "Prints a greeting for every argument it is given.",
//!   "command": "$PLUGRUN_PLUGIN_DIR/hello.sh"
//! }
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use plugrun::config::PluginSettings;
//! use plugrun::plugins::{find_all, Dispatcher, PluginRegistry};
//!
//! # async fn demo() -> plugrun::Result<()> {
//! let settings = PluginSettings::from_env()?;
//! let mut registry = PluginRegistry::new();
//! registry.register_all(find_all(&settings.search_path).into_result()?);
//!
//! let dispatcher = Dispatcher::for_current_exe(settings);
//! if let Some(plugin) = registry.get("hello") {
//!     let mut stdout = tokio::io::stdout();
//!     dispatcher.run(plugin, &["world".into()], &mut stdout).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
mod loader;
pub mod registry;
pub mod types;

pub use dispatch::Dispatcher;
pub use loader::{find_all, load_all, load_plugin, validate_metadata, Discovery, MANIFEST_FILE};
pub use registry::PluginRegistry;
pub use types::{Invocation, InvocationEnv, PluginDescriptor, PluginMetadata};
