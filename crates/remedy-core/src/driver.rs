//! Sequential runner over a set of rules
//!
//! The driver applies one lifecycle action to every rule in turn and collects
//! a per-rule outcome. A failing rule never stops the ones after it. An
//! operator interrupt aborts the run, and so does a fatal error such as an
//! invalid rule configuration or applicability descriptor.

use std::fmt;
use std::sync::Arc;

use remedy_host::{CommandRunner, InterruptFlag};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::changelog::ChangeLog;
use crate::environment::Environment;
use crate::rules::{Compliance, RuleHandle};
use crate::Result;

/// Which lifecycle action a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Report,
    Fix,
    Undo,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Report => "report",
            Self::Fix => "fix",
            Self::Undo => "undo",
        };
        f.write_str(name)
    }
}

/// What happened to one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Compliant,
    NonCompliant,
    Invalid,
    Fixed,
    FixFailed,
    Undone,
    UndoFailed,
    /// The applicability descriptor excludes this host
    NotApplicable,
    /// Not attempted, e.g. disabled or not running as root
    Skipped,
    Error,
}

impl Status {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Compliant | Self::Fixed | Self::Undone)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::NotApplicable | Self::Skipped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non-compliant",
            Self::Invalid => "invalid",
            Self::Fixed => "fixed",
            Self::FixFailed => "fix failed",
            Self::Undone => "undone",
            Self::UndoFailed => "undo failed",
            Self::NotApplicable => "not applicable",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        f.pad(name)
    }
}

impl From<&Compliance> for Status {
    fn from(c: &Compliance) -> Self {
        match c {
            Compliance::Compliant => Self::Compliant,
            Compliance::NonCompliant => Self::NonCompliant,
            Compliance::Invalid(_) => Self::Invalid,
        }
    }
}

/// Outcome of one rule in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub id: u32,
    pub name: String,
    pub status: Status,
    /// Results text, one line per finding or failure
    pub detail: Vec<String>,
}

/// Pass/fail counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    fn add(&mut self, status: &Status) {
        if status.is_pass() {
            self.passed += 1;
        } else if status.is_skip() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Report from a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub outcomes: Vec<RuleOutcome>,
    pub tally: Tally,
}

impl RunReport {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            outcomes: Vec::new(),
            tally: Tally::default(),
        }
    }

    fn push(&mut self, outcome: RuleOutcome) {
        self.tally.add(&outcome.status);
        self.outcomes.push(outcome);
    }

    /// True when no rule failed.
    pub fn is_success(&self) -> bool {
        self.tally.failed == 0
    }
}

/// Runs rules one after another against a single host.
pub struct Driver<'a> {
    env: &'a dyn Environment,
    runner: Arc<dyn CommandRunner>,
    changelog: &'a mut ChangeLog,
    interrupt: InterruptFlag,
}

impl<'a> Driver<'a> {
    pub fn new(
        env: &'a dyn Environment,
        runner: Arc<dyn CommandRunner>,
        changelog: &'a mut ChangeLog,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            env,
            runner,
            changelog,
            interrupt,
        }
    }

    /// Apply `mode` to every rule.
    ///
    /// Returns `Err` for an interrupt or a fatal error; every other failure
    /// is recorded as that rule's outcome.
    pub fn run(&mut self, rules: &mut [RuleHandle], mode: RunMode) -> Result<RunReport> {
        info!(%mode, rules = rules.len(), "Starting run");
        let mut report = RunReport::new(mode);

        for handle in rules.iter_mut() {
            self.interrupt.check()?;

            let result = match self.gate(handle, mode) {
                Ok(Some(status)) => Ok((status, Vec::new())),
                Ok(None) => self.run_one(handle, mode),
                Err(e) => Err(e),
            };
            let (status, mut detail) = match result {
                Ok(done) => done,
                Err(e) if e.is_fatal() => {
                    error!(rule = %handle.info().name, error = %e, "Aborting run");
                    return Err(e);
                }
                Err(e) => {
                    error!(rule = %handle.info().name, error = %e, "Rule failed");
                    let mut detail = handle.detail().to_vec();
                    detail.push(e.to_string());
                    (Status::Error, detail)
                }
            };
            if status == Status::Skipped && detail.is_empty() {
                detail.push(skip_reason(handle, self.env));
            }

            report.push(RuleOutcome {
                id: handle.info().id,
                name: handle.info().name.clone(),
                status,
                detail,
            });
        }

        info!(
            %mode,
            passed = report.tally.passed,
            failed = report.tally.failed,
            skipped = report.tally.skipped,
            "Run finished"
        );
        Ok(report)
    }

    /// Decide whether a rule runs at all on this host.
    fn gate(&self, handle: &RuleHandle, mode: RunMode) -> Result<Option<Status>> {
        if mode == RunMode::Undo {
            return Ok(None);
        }
        if !handle.is_applicable(self.env)? {
            return Ok(Some(Status::NotApplicable));
        }
        if mode == RunMode::Fix && handle.info().root_required && !self.env.is_root() {
            warn!(rule = %handle.info().name, "Skipping fix that requires root");
            return Ok(Some(Status::Skipped));
        }
        Ok(None)
    }

    fn run_one(&mut self, handle: &mut RuleHandle, mode: RunMode) -> Result<(Status, Vec<String>)> {
        let runner = Arc::clone(&self.runner);
        match mode {
            RunMode::Report => {
                let status = Status::from(handle.report(self.env, runner)?);
                Ok((status, handle.detail().to_vec()))
            }
            RunMode::Fix => {
                let before = handle.report(self.env, Arc::clone(&runner))?.clone();
                if before != Compliance::NonCompliant {
                    return Ok((Status::from(&before), handle.detail().to_vec()));
                }
                if !handle.is_enabled() {
                    return Ok((Status::Skipped, Vec::new()));
                }
                let ok = handle.fix(self.env, Arc::clone(&runner), self.changelog)?;
                let mut detail = handle.detail().to_vec();

                // Confirm the host now reports compliant
                let after = handle.report(self.env, runner)?.clone();
                if ok && after.is_compliant() {
                    return Ok((Status::Fixed, detail));
                }
                detail.extend(handle.detail().iter().map(|d| format!("after fix: {d}")));
                Ok((Status::FixFailed, detail))
            }
            RunMode::Undo => {
                let status = if handle.undo(runner, self.changelog)? {
                    Status::Undone
                } else {
                    Status::UndoFailed
                };
                Ok((status, handle.detail().to_vec()))
            }
        }
    }
}

fn skip_reason(handle: &RuleHandle, env: &dyn Environment) -> String {
    if handle.info().root_required && !env.is_root() {
        "requires root".to_string()
    } else {
        format!("{} is not enabled", handle.info().enable_key())
    }
}
