//! report, fix and undo

use std::sync::Arc;

use colored::{ColoredString, Colorize};
use remedy_core::{ChangeLog, Driver, RunMode, RunReport, Status};
use tracing::info;

use crate::cli::RunArgs;
use crate::context::{Session, apply_all};
use crate::error::Result;

/// Run `mode` over the selected rules. Returns true when no rule failed.
pub fn run_rules(session: &Session, mode: RunMode, args: &RunArgs) -> Result<bool> {
    let mut config = session.rule_config()?;
    let mut rules = session.rules(&args.rules)?;
    apply_all(&config, &mut rules)?;

    let env = session.environment()?;
    let settings = &session.settings;
    let mut changelog = match mode {
        RunMode::Report => ChangeLog::in_memory(&settings.backup_dir),
        RunMode::Fix | RunMode::Undo => ChangeLog::open(&settings.changelog, &settings.backup_dir)?,
    };

    let report = Driver::new(
        &env,
        Arc::clone(&session.runner),
        &mut changelog,
        session.interrupt.clone(),
    )
    .run(&mut rules, mode)?;

    if mode != RunMode::Report {
        session.save_config(&mut config, &rules)?;
    }
    info!(%mode, passed = report.tally.passed, failed = report.tally.failed, "Run finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.is_success())
}

fn badge(status: &Status) -> ColoredString {
    let label = format!("{status:<14}");
    if status.is_pass() {
        label.green()
    } else if status.is_skip() {
        label.dimmed()
    } else if matches!(status, Status::NonCompliant) {
        label.yellow()
    } else {
        label.red()
    }
}

fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        println!("{} {:>4}  {}", badge(&outcome.status), outcome.id, outcome.name.bold());
        for line in &outcome.detail {
            println!("{:21}{}", "", line);
        }
    }
    let tally = &report.tally;
    println!();
    println!(
        "{}: {} passed, {} failed, {} skipped",
        report.mode.to_string().bold(),
        tally.passed.to_string().green(),
        if tally.failed > 0 {
            tally.failed.to_string().red()
        } else {
            tally.failed.to_string().normal()
        },
        tally.skipped
    );
}
