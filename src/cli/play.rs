//! Play command implementation.

use super::output::{format_summary, render_board};
use super::script::{ChallengerScript, run_script};
use super::{CliError, OutputFormat, load_rules, print_json};
use rampart::ledger::ProgressionLedger;
use rampart::{Engine, Profile, ScriptGateway};
use std::path::Path;
use std::sync::Arc;

/// Execute the play command.
///
/// # Errors
///
/// Returns an error if the script, config or ledger cannot be loaded, or
/// the ledger cannot be saved.
pub(crate) fn execute(
    script: &Path,
    ledger: &Path,
    config: Option<&Path>,
    profile: Option<Profile>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let rules = load_rules(config, profile)?;
    let challenger = ChallengerScript::load(script)?;
    let engine = Engine::new(rules, Arc::new(ScriptGateway))
        .with_ledger(ProgressionLedger::load_or_default(ledger)?);

    let summary = run_script(&engine, &challenger)?;
    engine.ledger().snapshot().save(ledger)?;

    match format {
        OutputFormat::Text => {
            print!("{}", format_summary(&summary));
            println!();
            print!("{}", render_board(&engine.board(summary.game)?));
            if let Some(round) = engine.last_round(summary.game)? {
                println!();
                println!(
                    "Last round: {} projectiles, {} hits, {} fuel",
                    round.trajectories.len(),
                    round.damage.len(),
                    round.fuel_used
                );
            }
        }
        OutputFormat::Json => print_json(&summary)?,
    }
    Ok(())
}
