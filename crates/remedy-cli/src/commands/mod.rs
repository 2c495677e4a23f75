//! Command implementations for remedy-cli

pub mod config;
pub mod list;
pub mod run;

use std::io;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;

pub use config::run_config;
pub use list::run_list;
pub use run::run_rules;

/// Print a completion script for `shell` to stdout.
pub fn run_completions(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "remedy", &mut io::stdout());
}
