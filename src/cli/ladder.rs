//! Ladder command implementation.

use super::output::format_leaderboard;
use super::{CliError, OutputFormat, print_json};
use rampart::ledger::ProgressionLedger;
use std::path::Path;

/// Execute the ladder command.
///
/// # Errors
///
/// Returns an error if the ledger cannot be loaded.
pub(crate) fn execute(ledger: &Path, format: OutputFormat) -> Result<(), CliError> {
    let ledger = ProgressionLedger::load_or_default(ledger)?;
    let entries = ledger.leaderboard();
    match format {
        OutputFormat::Text => print!("{}", format_leaderboard(&entries)),
        OutputFormat::Json => print_json(&entries)?,
    }
    Ok(())
}
