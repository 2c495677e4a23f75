//! The contract every compliance rule implements

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use remedy_host::{CommandRunner, FileMeta, io};
use remedy_kv::KeyValueEditor;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::applicability::Applicability;
use crate::changelog::{ChangeLog, Event, EventIds, EventKind};
use crate::environment::Environment;
use crate::item::ConfigurationItem;
use crate::Result;

/// Static description of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub root_required: bool,
    #[serde(default)]
    pub applicability: Applicability,
}

impl RuleInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            mandatory: false,
            root_required: false,
            applicability: Applicability::default(),
        }
    }

    /// Key of the configuration item that enables the fix.
    pub fn enable_key(&self) -> String {
        self.name.to_uppercase()
    }
}

/// Result of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Compliance {
    Compliant,
    NonCompliant,
    /// The target could not be interpreted
    Invalid(String),
}

impl Compliance {
    pub fn is_compliant(&self) -> bool {
        matches!(self, Self::Compliant)
    }
}

impl fmt::Display for Compliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compliant => write!(f, "compliant"),
            Self::NonCompliant => write!(f, "non-compliant"),
            Self::Invalid(reason) => write!(f, "invalid ({reason})"),
        }
    }
}

impl From<remedy_kv::Validation> for Compliance {
    fn from(v: remedy_kv::Validation) -> Self {
        match v {
            remedy_kv::Validation::Compliant => Self::Compliant,
            remedy_kv::Validation::NonCompliant => Self::NonCompliant,
            remedy_kv::Validation::Invalid(reason) => Self::Invalid(reason),
        }
    }
}

/// Compliance plus the lines explaining it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub compliance: Compliance,
    pub detail: Vec<String>,
}

impl Finding {
    pub fn compliant() -> Self {
        Self {
            compliance: Compliance::Compliant,
            detail: Vec::new(),
        }
    }

    pub fn non_compliant(detail: impl Into<String>) -> Self {
        Self {
            compliance: Compliance::NonCompliant,
            detail: vec![detail.into()],
        }
    }
}

/// What a report may read from the host.
pub struct ReportContext<'a> {
    pub env: &'a dyn Environment,
    pub runner: Arc<dyn CommandRunner>,
}

/// What a fix may touch: the host through the runner, and the change log.
///
/// Every mutation helper records its event as soon as the mutation has
/// succeeded.
pub struct FixContext<'a> {
    pub env: &'a dyn Environment,
    pub runner: Arc<dyn CommandRunner>,
    rule: u32,
    changelog: &'a mut ChangeLog,
    ids: EventIds,
    detail: Vec<String>,
}

impl<'a> FixContext<'a> {
    pub fn new(
        rule: u32,
        env: &'a dyn Environment,
        runner: Arc<dyn CommandRunner>,
        changelog: &'a mut ChangeLog,
    ) -> Self {
        let ids = EventIds::after(changelog.last_id(rule), rule);
        Self {
            env,
            runner,
            rule,
            changelog,
            ids,
            detail: Vec::new(),
        }
    }

    /// Add a line to the rule's detailed results.
    pub fn note(&mut self, line: impl Into<String>) {
        self.detail.push(line.into());
    }

    pub(crate) fn take_detail(&mut self) -> Vec<String> {
        std::mem::take(&mut self.detail)
    }

    /// Record an event the rule produced itself.
    pub fn record(&mut self, kind: EventKind) -> Result<()> {
        let id = self.ids.next_id();
        self.changelog.record_event(self.rule, id, kind)
    }

    /// Commit an updated editor and record how to reverse it.
    ///
    /// File-backed targets are backed up first; tool-backed targets record
    /// the commands that ran and their reversal. An id is only taken when a
    /// change is recorded.
    pub fn commit_editor(&mut self, editor: &mut KeyValueEditor) -> Result<bool> {
        if editor.spec().dialect.is_file_backed() {
            let path = editor.path().to_path_buf();
            let pending = self.ids.peek();
            let prior = FileMeta::read_optional(&path)?;
            let backup = self.changelog.backup(pending, &path)?;
            let before = io::read_bytes_optional(&path)?;

            let committed = editor.commit();
            let unchanged = match &committed {
                Ok(_) => io::read_bytes_optional(&path)? == before,
                Err(_) => true,
            };
            if unchanged {
                if let Some(backup) = &backup {
                    self.changelog.backups().discard(backup)?;
                }
                return Ok(committed?);
            }
            let committed = committed?;
            let id = self.ids.next_id();
            self.changelog
                .record_file_change(backup.as_deref(), &path, id, prior)?;
            return Ok(committed);
        }

        let committed = editor.commit();
        self.record_tool_changes(editor)?;
        Ok(committed?)
    }

    /// Record the commands a tool-backed editor has run so far.
    ///
    /// Called after `commit`, and also when `update` fails partway so the
    /// keys already changed can still be undone.
    pub fn record_tool_changes(&mut self, editor: &KeyValueEditor) -> Result<()> {
        let run = editor.applied_commands();
        if run.is_empty() {
            return Ok(());
        }
        let undo = editor.undo_commands();
        self.record(EventKind::Command { run, undo })
    }

    /// Set mode and ownership of `path`, recording the prior values.
    pub fn set_permissions(&mut self, path: &Path, meta: FileMeta) -> Result<bool> {
        let prior = FileMeta::read(path)?;
        if prior == meta {
            return Ok(true);
        }
        meta.apply(path)?;
        self.record(EventKind::Permission {
            path: path.to_path_buf(),
            prior,
        })?;
        Ok(true)
    }

    /// Create a file that does not exist yet.
    pub fn create_file(&mut self, path: &Path, content: &str) -> Result<bool> {
        if path.exists() {
            warn!(path = %path.display(), "Refusing to create a file that exists");
            return Ok(false);
        }
        io::write_atomic(path, content.as_bytes())?;
        self.record(EventKind::Creation {
            path: path.to_path_buf(),
        })?;
        Ok(true)
    }

    /// Record that `package` changed state; `prior` is what undo restores.
    pub fn record_package_state(&mut self, package: &str, prior: &str) -> Result<()> {
        self.record(EventKind::PackageState {
            package: package.to_string(),
            prior: prior.to_string(),
        })
    }

    /// Run a command; on success record it with its reversal.
    pub fn run_command(&mut self, argv: Vec<String>, undo: Option<Vec<String>>) -> Result<bool> {
        let out = self.runner.execute(&argv)?;
        if !out.success() {
            warn!(command = %argv.join(" "), code = out.code(), stderr = %out.stderr.trim(), "Fix command failed");
            self.note(format!(
                "`{}` failed with exit code {}: {}",
                argv.join(" "),
                out.code(),
                out.stderr.trim()
            ));
            return Ok(false);
        }
        debug!(command = %argv.join(" "), "Fix command succeeded");
        self.record(EventKind::Command {
            run: vec![argv],
            undo: undo.into_iter().collect(),
        })?;
        Ok(true)
    }
}

/// A compliance rule.
///
/// Implementations read the host in `report`, change it in `fix` through
/// the [`FixContext`] helpers, and reverse domain-specific events in
/// `reverse`. The lifecycle itself (enable checks, stale event cleanup,
/// undo order) is enforced by [`super::RuleHandle`].
pub trait Rule {
    fn info(&self) -> &RuleInfo;

    fn items(&self) -> &[ConfigurationItem];

    fn items_mut(&mut self) -> &mut [ConfigurationItem];

    /// Inspect the host. Must not change it.
    fn report(&mut self, ctx: &ReportContext<'_>) -> Result<Finding>;

    /// Apply every needed change, attempting all of them.
    fn fix(&mut self, ctx: &mut FixContext<'_>) -> Result<bool>;

    /// Reverse a package or command event this rule recorded.
    ///
    /// The default runs the recorded undo commands in order.
    fn reverse(&self, event: &Event, runner: &dyn CommandRunner) -> Result<bool> {
        match &event.kind {
            EventKind::Command { undo, .. } if !undo.is_empty() => {
                let mut ok = true;
                for argv in undo {
                    let out = runner.execute(argv)?;
                    if !out.success() {
                        warn!(command = %argv.join(" "), stderr = %out.stderr.trim(), "Undo command failed");
                        ok = false;
                    }
                }
                Ok(ok)
            }
            _ => Ok(false),
        }
    }
}
