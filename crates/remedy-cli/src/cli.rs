//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// remedy - audit and harden host configuration against security benchmarks
#[derive(Parser, Debug)]
#[command(name = "remedy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to /etc/remedy/remedy.toml when present)
    #[arg(long, global = true, env = "REMEDY_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(flatten)]
    pub host: HostArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Describe the host instead of probing it.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct HostArgs {
    /// OS family, e.g. linux or darwin
    #[arg(long, global = true)]
    pub os_family: Option<String>,

    /// OS name, e.g. "Mac OS X" or Ubuntu
    #[arg(long, global = true, requires = "os_family")]
    pub os_type: Option<String>,

    /// OS version, e.g. 10.12
    #[arg(long, global = true, requires = "os_family")]
    pub os_version: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the registered rules
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Check every applicable rule without changing anything
    Report(RunArgs),

    /// Fix enabled, non-compliant rules
    ///
    /// Every change is recorded so `remedy undo` can reverse it.
    Fix(RunArgs),

    /// Reverse the changes made by the last fix of each rule
    Undo(RunArgs),

    /// Manage the rule configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    ///
    /// Examples:
    ///   remedy completions bash > ~/.local/share/bash-completion/completions/remedy
    ///   remedy completions zsh > ~/.zfunc/_remedy
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by report, fix and undo.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Only run the named rules (repeatable)
    #[arg(short, long = "rule")]
    pub rules: Vec<String>,

    /// Output as JSON for scripting
    #[arg(long)]
    pub json: bool,
}

/// Rule configuration actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Only items flagged simple
        #[arg(long)]
        simple: bool,
    },

    /// Set one item of one rule
    Set {
        /// Rule name, e.g. AslrEnabled
        rule: String,
        /// Item key, e.g. ASLRENABLED
        key: String,
        /// New value in config-file syntax
        value: String,
    },

    /// Write the effective configuration to the rule config path
    Save {
        /// Only write items flagged simple
        #[arg(long)]
        simple: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_fix_with_rules() {
        let cli = Cli::try_parse_from(["remedy", "fix", "-r", "AslrEnabled", "--rule", "NoRootLogin"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Fix(RunArgs {
                rules: vec!["AslrEnabled".into(), "NoRootLogin".into()],
                json: false,
            }))
        );
    }

    #[test]
    fn host_flags_are_global() {
        let cli = Cli::try_parse_from([
            "remedy",
            "report",
            "--os-family",
            "linux",
            "--os-version",
            "22.04",
        ])
        .unwrap();
        assert_eq!(cli.host.os_family.as_deref(), Some("linux"));
        assert_eq!(cli.host.os_version.as_deref(), Some("22.04"));
    }

    #[test]
    fn config_set_takes_three_positionals() {
        let cli = Cli::try_parse_from(["remedy", "config", "set", "LoginDefs", "UMASK", "077"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Set {
                    rule: "LoginDefs".into(),
                    key: "UMASK".into(),
                    value: "077".into(),
                }
            })
        );
    }
}
