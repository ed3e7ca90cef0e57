//! CLI command implementations for Rampart.

pub(crate) mod compile;
pub(crate) mod gauntlet;
pub(crate) mod ladder;
pub(crate) mod play;

mod output;
mod script;

use clap::ValueEnum;
use rampart::config::ConfigError;
use rampart::ledger::LedgerError;
use rampart::{ActionError, EngineConfig, Profile};
use std::error::Error;
use std::fmt;
use std::path::Path;

/// Output format for commands that print results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<ActionError> for CliError {
    fn from(e: ActionError) -> Self {
        Self::new(format!("{:?}: {e}", e.kind()))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {e}"))
    }
}

/// Rules from an optional config file, with an optional profile applied on
/// top.
fn load_rules(config: Option<&Path>, profile: Option<Profile>) -> Result<EngineConfig, CliError> {
    let mut rules = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(profile) = profile {
        rules.simulation.tick_count = profile.tick_count();
    }
    Ok(rules)
}

/// Print `value` as pretty JSON.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
