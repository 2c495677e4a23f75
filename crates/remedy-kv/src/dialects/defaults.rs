//! Preference domains behind the `defaults` tool
//!
//! The store holds no text: every read and write goes through the command
//! runner. Values seen before the first change are remembered so the store
//! can hand back the commands that put them back.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use remedy_host::{CommandRunner, exec::argv};
use tracing::{debug, warn};

use crate::data::{FlatData, Intent, KvData, KvValue};
use crate::store::{ConfigStore, Reconciliation};
use crate::{Error, Result};

const TOOL: &str = "defaults";

/// A value as the tool reported it before any change.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Prior {
    kind: String,
    printed: String,
}

/// One preference domain.
pub struct DefaultsStore {
    domain: String,
    runner: Arc<dyn CommandRunner>,
    priors: BTreeMap<String, Option<Prior>>,
    /// Keys changed, in first-change order
    applied: Vec<String>,
    commands: Vec<Vec<String>>,
}

impl std::fmt::Debug for DefaultsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultsStore")
            .field("domain", &self.domain)
            .field("applied", &self.applied)
            .finish()
    }
}

impl DefaultsStore {
    /// Open the domain named by `path` (a domain name or a plist path).
    pub fn open(path: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            domain: path.to_string_lossy().into_owned(),
            runner,
            priors: BTreeMap::new(),
            applied: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Current printed value of `key`, `None` when the pair does not exist.
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        self.query("read", key)
    }

    fn query(&self, verb: &str, key: &str) -> Result<Option<String>> {
        let cmd = argv(&[TOOL, verb, &self.domain, key]);
        let out = self.runner.execute(&cmd)?;
        if out.success() {
            return Ok(Some(out.stdout.trim_end().to_string()));
        }
        if out.stderr.contains("does not exist") {
            return Ok(None);
        }
        Err(Error::ExternalTool {
            command: cmd.join(" "),
            code: out.code(),
            stderr: out.stderr.trim().to_string(),
        })
    }

    /// Remember the pre-change state of `key` once.
    fn capture(&mut self, key: &str) -> Result<()> {
        if self.priors.contains_key(key) {
            return Ok(());
        }
        let prior = match self.read(key)? {
            Some(printed) => {
                let kind = self
                    .query("read-type", key)?
                    .and_then(|t| t.strip_prefix("Type is ").map(|k| k.trim().to_string()))
                    .unwrap_or_else(|| "string".to_string());
                Some(Prior { kind, printed })
            }
            None => None,
        };
        self.priors.insert(key.to_string(), prior);
        Ok(())
    }

    fn run(&mut self, cmd: Vec<String>, key: &str) -> Result<bool> {
        let out = self.runner.execute(&cmd)?;
        if out.success() {
            debug!(command = %cmd.join(" "), "defaults change applied");
            if !self.applied.iter().any(|k| k == key) {
                self.applied.push(key.to_string());
            }
            self.commands.push(cmd);
            Ok(true)
        } else {
            warn!(command = %cmd.join(" "), code = out.code(), stderr = %out.stderr.trim(), "defaults change failed");
            Ok(false)
        }
    }

    fn write_cmd(&self, key: &str, value: &KvValue, kind: Option<&str>) -> Vec<String> {
        let mut cmd = argv(&[TOOL, "write", &self.domain, key]);
        match value {
            KvValue::List(items) => {
                cmd.push("-array".into());
                cmd.extend(items.iter().cloned());
            }
            KvValue::Scalar(s) => {
                let (flag, text) = scalar_flag(s, kind);
                cmd.push(flag.into());
                cmd.push(text);
            }
        }
        cmd
    }

    fn delete_cmd(&self, key: &str) -> Vec<String> {
        argv(&[TOOL, "delete", &self.domain, key])
    }

    /// Run the change of one key. Any failure but an interrupt fails only
    /// that key; the caller moves on to the next one.
    fn settle(&mut self, key: &str, change: impl FnOnce(&mut Self) -> Result<bool>) -> Result<bool> {
        match change(self) {
            Ok(ok) => Ok(ok),
            Err(e) if e.is_interrupt() => Err(e),
            Err(e) => {
                warn!(domain = %self.domain, key, error = %e, "defaults change failed");
                Ok(false)
            }
        }
    }

    fn prior_kind(&self, key: &str) -> Option<&str> {
        self.priors
            .get(key)
            .and_then(|p| p.as_ref())
            .map(|p| p.kind.as_str())
    }
}

impl ConfigStore for DefaultsStore {
    fn reconcile(&mut self, desired: &KvData, intent: Intent) -> Result<Reconciliation> {
        let desired = desired
            .as_flat()
            .ok_or_else(|| Error::Validation("defaults data must be flat".into()))?;

        let mut fixes = FlatData::new();
        let mut removes = FlatData::new();
        for (key, want) in desired {
            let current = self.read(key)?;
            match intent {
                Intent::Present => {
                    let ok = current.as_deref().is_some_and(|c| matches_value(c, want));
                    if !ok {
                        fixes.insert(key.clone(), want.clone());
                    }
                }
                Intent::NotPresent => {
                    let Some(current) = current else { continue };
                    match want {
                        KvValue::Scalar(_) if matches_value(&current, want) => {
                            removes.insert(key.clone(), want.clone());
                        }
                        KvValue::List(banned) => {
                            let have = parse_array(&current).unwrap_or_default();
                            let hits: Vec<String> =
                                banned.iter().filter(|b| have.contains(b)).cloned().collect();
                            if !hits.is_empty() {
                                removes.insert(key.clone(), KvValue::List(hits));
                            }
                        }
                        KvValue::Scalar(_) => {}
                    }
                }
            }
        }
        Ok(Reconciliation::new(
            KvData::Flat(fixes),
            KvData::Flat(removes),
            Vec::new(),
        ))
    }

    fn apply(&mut self, fixables: &KvData, removables: &KvData) -> Result<bool> {
        let mut all_ok = true;

        if let Some(fixes) = fixables.as_flat() {
            for (key, value) in fixes {
                all_ok &= self.settle(key, |store| {
                    store.capture(key)?;
                    let cmd = store.write_cmd(key, value, store.prior_kind(key));
                    store.run(cmd, key)
                })?;
            }
        }

        if let Some(removes) = removables.as_flat() {
            for (key, value) in removes {
                all_ok &= self.settle(key, |store| {
                    store.capture(key)?;
                    let cmd = match value {
                        KvValue::Scalar(_) => store.delete_cmd(key),
                        KvValue::List(banned) => {
                            let current = store.read(key)?.unwrap_or_default();
                            let kept: Vec<String> = parse_array(&current)
                                .unwrap_or_default()
                                .into_iter()
                                .filter(|e| !banned.contains(e))
                                .collect();
                            if kept.is_empty() {
                                store.delete_cmd(key)
                            } else {
                                store.write_cmd(key, &KvValue::List(kept), Some("array"))
                            }
                        }
                    };
                    store.run(cmd, key)
                })?;
            }
        }
        Ok(all_ok)
    }

    fn applied_commands(&self) -> Vec<Vec<String>> {
        self.commands.clone()
    }

    /// Restore every changed key, most recent change first.
    fn undo_commands(&self) -> Vec<Vec<String>> {
        let mut cmds = Vec::new();
        for key in self.applied.iter().rev() {
            match self.priors.get(key) {
                Some(None) => cmds.push(self.delete_cmd(key)),
                Some(Some(prior)) => {
                    let value = match parse_array(&prior.printed) {
                        Some(items) if prior.kind == "array" => KvValue::List(items),
                        _ => KvValue::Scalar(prior.printed.clone()),
                    };
                    cmds.push(self.write_cmd(key, &value, Some(&prior.kind)));
                }
                None => {}
            }
        }
        cmds
    }
}

/// Booleans print as 1/0 but are written as true/false or yes/no.
fn normalize(value: &str) -> &str {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => "1",
        "false" | "no" => "0",
        _ => value.trim(),
    }
}

fn matches_value(printed: &str, want: &KvValue) -> bool {
    match want {
        KvValue::Scalar(s) => normalize(printed) == normalize(s),
        KvValue::List(items) => match parse_array(printed) {
            Some(have) => {
                let want: std::collections::BTreeSet<&str> = items.iter().map(String::as_str).collect();
                let have: std::collections::BTreeSet<&str> = have.iter().map(String::as_str).collect();
                want == have
            }
            None => false,
        },
    }
}

/// Parse the `( a, b )` form `defaults read` prints for arrays.
fn parse_array(printed: &str) -> Option<Vec<String>> {
    let inner = printed.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split([',', '\n'])
            .map(|e| e.trim().trim_matches('"').to_string())
            .filter(|e| !e.is_empty())
            .collect(),
    )
}

fn scalar_flag(value: &str, kind: Option<&str>) -> (&'static str, String) {
    let lower = value.trim().to_ascii_lowercase();
    match kind {
        Some("boolean") if matches!(normalize(value), "1" | "0") => {
            let text = if normalize(value) == "1" { "TRUE" } else { "FALSE" };
            return ("-bool", text.to_string());
        }
        Some("string") => return ("-string", value.to_string()),
        _ => {}
    }
    if matches!(lower.as_str(), "true" | "false" | "yes" | "no") {
        let text = if normalize(value) == "1" { "TRUE" } else { "FALSE" };
        ("-bool", text.to_string())
    } else if value.parse::<i64>().is_ok() {
        ("-int", value.to_string())
    } else if value.contains('.') && value.parse::<f64>().is_ok() {
        ("-float", value.to_string())
    } else {
        ("-string", value.to_string())
    }
}
