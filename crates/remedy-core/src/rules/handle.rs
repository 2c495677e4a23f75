//! Lifecycle enforcement around a [`Rule`]

use std::fmt;
use std::sync::Arc;

use remedy_host::CommandRunner;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rule::{Compliance, Finding, FixContext, ReportContext, Rule, RuleInfo};
use crate::changelog::{ChangeLog, Event, ReverseAction};
use crate::environment::Environment;
use crate::item::ConfigurationItem;
use crate::{Error, Result};

/// Where a rule is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    New,
    Reported,
    Fixed,
    Undone,
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Reported => "reported",
            Self::Fixed => "fixed",
            Self::Undone => "undone",
        };
        f.write_str(name)
    }
}

/// Adapter handing package and command events back to the owning rule.
struct RuleReverse<'a> {
    rule: &'a dyn Rule,
    runner: &'a dyn CommandRunner,
}

impl ReverseAction for RuleReverse<'_> {
    fn reverse(&self, event: &Event) -> Result<bool> {
        self.rule.reverse(event, self.runner)
    }
}

/// A rule plus its compliance state and results text.
///
/// The handle owns the `NEW -> REPORTED -> FIXED -> UNDONE` transitions:
/// rules only implement the domain work. `report` may be repeated at any
/// point before `undo` without moving a fixed rule back; `UNDONE` is
/// terminal and only a further `undo` is accepted.
pub struct RuleHandle {
    rule: Box<dyn Rule>,
    state: RuleState,
    compliance: Option<Compliance>,
    detail: Vec<String>,
}

impl fmt::Debug for RuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleHandle")
            .field("id", &self.info().id)
            .field("name", &self.info().name)
            .field("state", &self.state)
            .field("compliance", &self.compliance)
            .finish()
    }
}

impl RuleHandle {
    pub fn new(rule: Box<dyn Rule>) -> Self {
        Self {
            rule,
            state: RuleState::New,
            compliance: None,
            detail: Vec::new(),
        }
    }

    pub fn info(&self) -> &RuleInfo {
        self.rule.info()
    }

    pub fn state(&self) -> RuleState {
        self.state
    }

    /// Compliance from the last report.
    pub fn compliance(&self) -> Option<&Compliance> {
        self.compliance.as_ref()
    }

    /// Detailed results, one line per finding or failure.
    pub fn detail(&self) -> &[String] {
        &self.detail
    }

    pub fn items(&self) -> &[ConfigurationItem] {
        self.rule.items()
    }

    pub fn items_mut(&mut self) -> &mut [ConfigurationItem] {
        self.rule.items_mut()
    }

    /// Whether the enabling item allows a fix.
    pub fn is_enabled(&self) -> bool {
        let key = self.info().enable_key();
        self.items()
            .iter()
            .find(|item| item.key() == key)
            .is_some_and(ConfigurationItem::is_truthy)
    }

    pub fn is_applicable(&self, env: &dyn Environment) -> Result<bool> {
        self.info().applicability.is_applicable(env)
    }

    fn lifecycle(&self, action: &'static str, reason: impl Into<String>) -> Error {
        Error::Lifecycle {
            rule: self.info().name.clone(),
            action,
            reason: reason.into(),
        }
    }

    /// Inspect the host and record compliance. Safe to call repeatedly.
    ///
    /// Parse problems become `Invalid`; unreadable targets and failing or
    /// timed-out tools become `NonCompliant` with the reason in the detail.
    pub fn report(&mut self, env: &dyn Environment, runner: Arc<dyn CommandRunner>) -> Result<&Compliance> {
        if self.state == RuleState::Undone {
            return Err(self.lifecycle("report", "it has been undone"));
        }
        let ctx = ReportContext { env, runner };
        let finding = match self.rule.report(&ctx) {
            Ok(finding) => finding,
            Err(e) => degrade(e)?,
        };

        debug!(rule = %self.info().name, compliance = %finding.compliance, "Reported");
        self.detail = finding.detail;
        if self.state == RuleState::New {
            self.state = RuleState::Reported;
        }
        Ok(self.compliance.insert(finding.compliance))
    }

    /// Bring the host into compliance.
    ///
    /// Requires a non-compliant report and a truthy enabling item. Events
    /// left by an earlier fix are discarded first. Returns false when any
    /// mutation failed.
    pub fn fix(
        &mut self,
        env: &dyn Environment,
        runner: Arc<dyn CommandRunner>,
        changelog: &mut ChangeLog,
    ) -> Result<bool> {
        if self.state == RuleState::Undone {
            return Err(self.lifecycle("fix", "it has been undone"));
        }
        match &self.compliance {
            None => return Err(self.lifecycle("fix", "it has not been reported")),
            Some(Compliance::NonCompliant) => {}
            Some(other) => {
                return Err(self.lifecycle("fix", format!("its last report was {other}")));
            }
        }
        if !self.is_enabled() {
            return Err(self.lifecycle(
                "fix",
                format!("{} is not enabled", self.info().enable_key()),
            ));
        }

        let id = self.info().id;
        changelog.clear_rule(id)?;

        let mut ctx = FixContext::new(id, env, runner, changelog);
        let result = self.rule.fix(&mut ctx);
        let mut notes = ctx.take_detail();

        let ok = match result {
            Ok(ok) => ok,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(rule = %self.info().name, error = %e, "Fix failed");
                notes.push(e.to_string());
                false
            }
        };

        self.detail.extend(notes);
        self.state = RuleState::Fixed;
        info!(rule = %self.info().name, ok, "Fixed");
        Ok(ok)
    }

    /// Reverse the events of the latest fix, newest first.
    ///
    /// A rule with no recorded events undoes successfully without doing
    /// anything. Events that cannot be reversed stay in the log.
    pub fn undo(&mut self, runner: Arc<dyn CommandRunner>, changelog: &mut ChangeLog) -> Result<bool> {
        let id = self.info().id;
        let ids: Vec<_> = changelog
            .find_events_for_rule(id)
            .iter()
            .rev()
            .map(|e| e.id)
            .collect();
        if ids.is_empty() {
            debug!(rule = %self.info().name, "Nothing to undo");
            self.state = RuleState::Undone;
            return Ok(true);
        }

        let reverse = RuleReverse {
            rule: self.rule.as_ref(),
            runner: runner.as_ref(),
        };
        let mut ok = true;
        for event in ids {
            match changelog.undo_event(event, &reverse) {
                Ok(true) => {}
                Ok(false) => {
                    self.detail.push(format!("event {event} could not be reversed"));
                    ok = false;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(event = %event, error = %e, "Undo failed");
                    self.detail.push(format!("event {event}: {e}"));
                    ok = false;
                }
            }
        }

        self.state = RuleState::Undone;
        info!(rule = %self.info().name, ok, "Undone");
        Ok(ok)
    }
}

/// Turn a report error into a finding, or re-raise it.
fn degrade(e: Error) -> Result<Finding> {
    if e.is_fatal() {
        return Err(e);
    }
    let finding = match &e {
        Error::Kv(remedy_kv::Error::Parse { .. }) => Finding {
            compliance: Compliance::Invalid(e.to_string()),
            detail: vec![e.to_string()],
        },
        Error::Kv(remedy_kv::Error::FileAccess { .. } | remedy_kv::Error::ExternalTool { .. })
        | Error::Kv(remedy_kv::Error::Host(remedy_host::Error::Timeout { .. }))
        | Error::Host(remedy_host::Error::Timeout { .. }) => Finding::non_compliant(e.to_string()),
        _ => return Err(e),
    };
    Ok(finding)
}
