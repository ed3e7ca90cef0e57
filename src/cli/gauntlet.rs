//! Gauntlet command implementation.

use super::output::{format_leaderboard, format_summary};
use super::script::{ChallengerScript, GameSummary, run_script};
use super::{CliError, OutputFormat, load_rules, print_json};
use indicatif::{ProgressBar, ProgressStyle};
use rampart::ledger::ProgressionLedger;
use rampart::{Engine, Profile, ScriptGateway, Side};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct GauntletReport {
    games: Vec<GameSummary>,
    challenger_wins: usize,
    defender_wins: usize,
    unfinished: usize,
}

/// Execute the gauntlet command.
///
/// Scripts play one after another so each game sees the ladder left by
/// the previous ones.
///
/// # Errors
///
/// Returns an error if a script, the config or the ledger cannot be loaded.
pub(crate) fn execute(
    scripts: &[PathBuf],
    ledger: &Path,
    config: Option<&Path>,
    profile: Option<Profile>,
    format: OutputFormat,
    progress: bool,
) -> Result<(), CliError> {
    let rules = load_rules(config, profile)?;
    let challengers = scripts
        .iter()
        .map(|p| ChallengerScript::load(p))
        .collect::<Result<Vec<_>, _>>()?;
    let engine = Engine::new(rules, Arc::new(ScriptGateway))
        .with_ledger(ProgressionLedger::load_or_default(ledger)?);

    let pb = if progress {
        let pb = ProgressBar::new(challengers.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} games")
            .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
            .progress_chars("=>-");
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    let mut games = Vec::with_capacity(challengers.len());
    for challenger in &challengers {
        games.push(run_script(&engine, challenger)?);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
    engine.ledger().snapshot().save(ledger)?;

    let count = |side| games.iter().filter(|g| g.winner == Some(side)).count();
    let report = GauntletReport {
        challenger_wins: count(Side::Player1),
        defender_wins: count(Side::Player2),
        unfinished: games.iter().filter(|g| !g.finished()).count(),
        games,
    };

    match format {
        OutputFormat::Text => {
            for game in &report.games {
                print!("{}", format_summary(game));
            }
            println!();
            println!(
                "Challenger wins: {}  Defender wins: {}  Unfinished: {}",
                report.challenger_wins, report.defender_wins, report.unfinished
            );
            println!();
            print!("{}", format_leaderboard(&engine.leaderboard()));
        }
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}
