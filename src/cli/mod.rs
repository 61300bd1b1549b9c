//! Command-line front end.
//!
//! Built-in commands come from the clap derive below. Plugin subcommands are
//! appended at startup with the builder API and routed through the registry.

mod plugins;

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{
    value_parser, Arg, ArgAction, ArgMatches, Command, CommandFactory, FromArgMatches, Parser,
    Subcommand,
};
use tracing::{debug, warn};

use plugrun::config::{default_plugin_dir, PluginSettings, NO_PLUGINS_ENV};
use plugrun::plugins::{find_all, Dispatcher, PluginDescriptor, PluginRegistry};

/// Name of the raw argument list on every plugin subcommand.
const PLUGIN_ARGS: &str = "args";

/// Subcommand names plugins may not take.
const BUILTIN_COMMANDS: &[&str] = &["version", "plugins", "help"];

#[derive(Parser)]
#[command(name = "plugrun", version)]
#[command(about = "Run external plugins as subcommands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,
    /// List discovered plugins
    Plugins {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse the process arguments and run the selected command.
pub(crate) async fn run() -> Result<()> {
    let settings = PluginSettings::from_env().context("Failed to load plugin settings")?;
    let registry = load_registry(&settings);

    let raw: Vec<OsString> = std::env::args_os().collect();
    let matches = build_command(&registry).get_matches_from(&raw);

    if let Some(plugin) = selected_plugin(&matches, &registry) {
        let args = passthrough_args(&raw, plugin.name());
        let dispatcher = Dispatcher::for_current_exe(settings);
        let mut stdout = tokio::io::stdout();
        dispatcher.run(plugin, &args, &mut stdout).await?;
        return Ok(());
    }

    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    match cli.command {
        Some(Commands::Version) | None => {
            println!("plugrun {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Plugins { json }) => {
            plugins::cmd_plugins(&registry, &settings, json)?;
        }
    }

    Ok(())
}

/// Discover and register plugins. Discovery failures are reported and
/// leave the registry empty.
fn load_registry(settings: &PluginSettings) -> PluginRegistry {
    load_registry_with(settings, &default_plugin_dir(), &mut std::io::stderr())
}

fn load_registry_with<W: Write>(
    settings: &PluginSettings,
    default_dir: &Path,
    diag: &mut W,
) -> PluginRegistry {
    let mut registry = PluginRegistry::with_reserved(BUILTIN_COMMANDS.iter().copied());

    if settings.disabled {
        debug!("{} is set, skipping plugin discovery", NO_PLUGINS_ENV);
        return registry;
    }

    // A default plugin directory that was never created just means no plugins.
    if settings.search_path.len() == 1
        && settings.search_path[0].as_path() == default_dir
        && !default_dir.exists()
    {
        debug!(dir = %default_dir.display(), "Default plugin directory does not exist");
        return registry;
    }

    match find_all(&settings.search_path).into_result() {
        Ok(found) => {
            registry.register_all(found);
        }
        Err(e) => {
            warn!(error = %e, "Plugin discovery failed, continuing without plugins");
            let _ = writeln!(diag, "failed to load plugins: {}", e);
        }
    }

    registry
}

/// The clap command tree: built-ins plus one subcommand per plugin.
fn build_command(registry: &PluginRegistry) -> Command {
    registry
        .plugins()
        .iter()
        .fold(Cli::command(), |cmd, plugin| cmd.subcommand(plugin_command(plugin)))
}

fn plugin_command(plugin: &PluginDescriptor) -> Command {
    let metadata = &plugin.metadata;

    let mut cmd = Command::new(metadata.name.clone())
        .about(metadata.short_help())
        .disable_help_flag(true)
        .arg(
            Arg::new(PLUGIN_ARGS)
                .action(ArgAction::Append)
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .value_parser(value_parser!(OsString)),
        );

    if !metadata.description.trim().is_empty() {
        cmd = cmd.long_about(metadata.description.clone());
    }
    cmd
}

fn selected_plugin<'a>(
    matches: &ArgMatches,
    registry: &'a PluginRegistry,
) -> Option<&'a PluginDescriptor> {
    let (name, _) = matches.subcommand()?;
    registry.get(name)
}

/// Everything after the plugin's subcommand name, exactly as typed.
///
/// Taken from the raw arguments rather than clap's matches so that a
/// leading `--` reaches the plugin too.
fn passthrough_args(raw: &[OsString], name: &str) -> Vec<OsString> {
    raw.iter()
        .skip(1)
        .skip_while(|arg| arg.as_os_str() != name)
        .skip(1)
        .cloned()
        .collect()
}
