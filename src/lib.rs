//! Plugrun - command-line front end for external plugin executables

pub mod config;
pub mod error;
pub mod plugins;

pub use config::PluginSettings;
pub use error::{PlugrunError, Result};
