//! Error types for Plugrun
//!
//! This module defines all error types used by plugin discovery and dispatch.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The primary error type for Plugrun operations.
#[derive(Error, Debug)]
pub enum PlugrunError {
    /// Configuration errors (invalid environment values, unusable search path, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A plugin directory could not be scanned, or a manifest inside it is
    /// unreadable, malformed, or invalid.
    #[error("Discovery error in {}: {message}", .path.display())]
    Discovery { path: PathBuf, message: String },

    /// The plugin's entry point could not be turned into a runnable command.
    #[error("Plugin {plugin:?} has an invalid entry point: {message}")]
    InvalidEntryPoint { plugin: String, message: String },

    /// The external process could not be started at all.
    #[error("Failed to run {}: {source}", .program.display())]
    Spawn {
        plugin: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plugin ran but exited with a non-zero status.
    #[error("plugin {plugin:?} exited with error")]
    PluginExecution { plugin: String, code: Option<i32> },

    /// The plugin did not finish within the configured timeout and was killed.
    #[error("plugin {plugin:?} timed out after {timeout:?}")]
    Timeout { plugin: String, timeout: Duration },

    /// The invocation was interrupted (Ctrl-C) and the plugin was killed after
    /// it did not exit within the grace period.
    #[error("plugin {plugin:?} was cancelled")]
    Cancelled { plugin: String },

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlugrunError {
    pub(crate) fn discovery(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Process exit code the binary should terminate with for this error.
    ///
    /// A plugin's own non-zero status is mirrored; everything else is `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PluginExecution {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// A specialized `Result` type for Plugrun operations.
pub type Result<T> = std::result::Result<T, PlugrunError>;
