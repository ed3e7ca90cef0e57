//! Rampart CLI - play scripted challengers against the ladder.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod cli;

use clap::{Parser, Subcommand};
use rampart::Profile;
use std::path::PathBuf;
use std::process::ExitCode;

/// Rampart - a deterministic tower-defense engine with programmable towers
#[derive(Parser, Debug)]
#[command(name = "rampart")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Play one scripted challenger against the ladder
    Play {
        /// Challenger script (JSON)
        #[arg(required = true)]
        script: PathBuf,

        /// Ledger file, created if missing
        #[arg(short, long, default_value = "rampart-ledger.json")]
        ledger: PathBuf,

        /// Engine config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tick-count profile, overriding the config
        #[arg(long)]
        profile: Option<Profile>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },

    /// Play many scripted challengers in sequence through one ladder
    Gauntlet {
        /// Challenger scripts (JSON)
        #[arg(required = true, num_args = 1..)]
        scripts: Vec<PathBuf>,

        /// Ledger file, created if missing
        #[arg(short, long, default_value = "rampart-ledger.json")]
        ledger: PathBuf,

        /// Engine config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tick-count profile, overriding the config
        #[arg(long)]
        profile: Option<Profile>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Compile tower logic with the reference compiler
    Compile {
        /// Logic source file
        #[arg(required = true)]
        source: PathBuf,

        /// Size limit to check against, in bytes (default: 1024)
        #[arg(short, long, default_value = "1024")]
        size_limit: usize,

        /// Write the image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the leaderboard
    Ladder {
        /// Ledger file
        #[arg(short, long, default_value = "rampart-ledger.json")]
        ledger: PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Play {
            script,
            ledger,
            config,
            profile,
            format,
        } => cli::play::execute(&script, &ledger, config.as_deref(), profile, format),

        Commands::Gauntlet {
            scripts,
            ledger,
            config,
            profile,
            format,
            progress,
        } => cli::gauntlet::execute(&scripts, &ledger, config.as_deref(), profile, format, progress),

        Commands::Compile {
            source,
            size_limit,
            output,
        } => cli::compile::execute(&source, size_limit, output.as_deref()),

        Commands::Ladder { ledger, format } => cli::ladder::execute(&ledger, format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
