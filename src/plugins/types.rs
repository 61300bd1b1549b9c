//! Plugin types for Plugrun
//!
//! This module defines the manifest structure parsed from `plugin.json`, the
//! discovered plugin descriptor, and the prepared invocation handed to the
//! dispatcher.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{PlugrunError, Result};

/// Environment overrides applied to one plugin invocation.
pub type InvocationEnv = BTreeMap<String, String>;

static VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("variable pattern is valid")
});

/// The manifest loaded from a plugin's `plugin.json` file.
///
/// # Example
///
/// ```json
/// {
///   "name": "hello",
///   "version": "0.1.0",
///   "usage": "say hello",
///   "description": "Prints a greeting for each argument.",
///   "command": "$PLUGRUN_PLUGIN_DIR/hello.sh --greeting"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name, used as the subcommand name.
    pub name: String,

    /// Optional version string, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// One-line help. Empty means a generated string is shown instead.
    #[serde(default)]
    pub usage: String,

    /// Long help text.
    #[serde(default)]
    pub description: String,

    /// Entry point: program followed by optional base arguments.
    /// `$VAR` / `${VAR}` references are expanded at invocation time.
    pub command: String,
}

impl PluginMetadata {
    /// Short help shown next to the subcommand.
    pub fn short_help(&self) -> String {
        if self.usage.trim().is_empty() {
            format!("the {:?} plugin", self.name)
        } else {
            self.usage.clone()
        }
    }
}

/// A discovered plugin: its metadata plus the directory it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Parsed manifest.
    pub metadata: PluginMetadata,

    /// Absolute path of the plugin directory.
    pub dir: PathBuf,
}

impl PluginDescriptor {
    pub fn new(metadata: PluginMetadata, dir: PathBuf) -> Self {
        Self { metadata, dir }
    }

    /// Plugin name from its manifest.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Build the external command for this plugin.
    ///
    /// The entry point is expanded against `env` first and the process
    /// environment second, then split on whitespace. `user_args` are appended
    /// verbatim after any base arguments from the entry point.
    pub fn prepare_invocation(
        &self,
        user_args: &[OsString],
        env: &InvocationEnv,
    ) -> Result<Invocation> {
        let expanded = expand_vars(&self.metadata.command, |key| {
            env.get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        });

        let mut words = expanded.split_whitespace();
        let program = words.next().ok_or_else(|| PlugrunError::InvalidEntryPoint {
            plugin: self.name().to_string(),
            message: format!("command {:?} is empty", self.metadata.command),
        })?;

        let mut args: Vec<OsString> = words.map(OsString::from).collect();
        args.extend(user_args.iter().cloned());

        Ok(Invocation {
            program: self.resolve_program(program),
            args,
            env: env.clone(),
        })
    }

    fn resolve_program(&self, program: &str) -> PathBuf {
        let path = Path::new(program);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if path.components().count() > 1 {
            return self.dir.join(path.strip_prefix(".").unwrap_or(path));
        }
        let local = self.dir.join(path);
        if local.is_file() {
            local
        } else {
            // Left bare so the OS resolves it through PATH.
            path.to_path_buf()
        }
    }
}

/// A fully prepared external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,

    /// Arguments after the executable.
    pub args: Vec<OsString>,

    /// Variables added on top of the inherited environment.
    pub env: InvocationEnv,
}

impl Invocation {
    /// The complete argument vector, executable first.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone().into_os_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Replace `$VAR` and `${VAR}` with values from `lookup`. Unknown variables
/// expand to nothing.
pub fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    VAR_RE
        .replace_all(input, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(key).unwrap_or_default()
        })
        .into_owned()
}
