//! remedy CLI
//!
//! Reports, fixes and undoes host hardening rules.

mod cli;
mod commands;
mod context;
mod error;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use cli::{Cli, Commands};
use context::Session;
use error::Result;

/// Exit code when a run finished but some rule failed.
const EXIT_RULES_FAILED: u8 = 2;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_RULES_FAILED),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so `--json` output stays clean. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!("Verbose mode enabled");

    let Some(command) = cli.command else {
        println!("{} host hardening", "remedy".green().bold());
        println!();
        println!("Run {} for available commands.", "remedy --help".cyan());
        return Ok(true);
    };

    if let Commands::Completions { shell } = command {
        commands::run_completions(shell);
        return Ok(true);
    }

    let session = Session::open(cli.settings.as_deref(), &cli.host)?;
    match command {
        Commands::List { json } => commands::run_list(&session, json).map(|()| true),
        Commands::Report(args) => commands::run_rules(&session, remedy_core::RunMode::Report, &args),
        Commands::Fix(args) => commands::run_rules(&session, remedy_core::RunMode::Fix, &args),
        Commands::Undo(args) => commands::run_rules(&session, remedy_core::RunMode::Undo, &args),
        Commands::Config { action } => commands::run_config(&session, action).map(|()| true),
        Commands::Completions { .. } => Ok(true),
    }
}
