//! A rule that drives one key-value editor
//!
//! Most benchmark checks boil down to "this file must (not) contain these
//! keys". [`KeyValueRule`] covers them from a declarative description: the
//! desired data is exposed as configuration items so operators can tune it
//! without touching the rule set.

use std::sync::Arc;

use remedy_host::{CommandRunner, io};
use remedy_kv::{EditorSpec, KeyValueEditor, KvData, KvValue, Validation};
use tracing::debug;

use super::rule::{Compliance, Finding, FixContext, ReportContext, Rule, RuleInfo};
use crate::item::{ConfigurationItem, ItemValue};
use crate::Result;

pub struct KeyValueRule {
    info: RuleInfo,
    spec: EditorSpec,
    items: Vec<ConfigurationItem>,
}

impl KeyValueRule {
    /// Build the rule and its items.
    ///
    /// The enabling item is on by default for mandatory rules. Flat data
    /// gets one item per key carrying the desired value. Unless the spec
    /// names one, the working copy is private to this rule.
    pub fn new(info: RuleInfo, mut spec: EditorSpec) -> Self {
        if spec.working_path.is_none() {
            let owner = format!("rule-{}", info.id);
            spec.working_path = Some(io::working_path(&spec.path, &owner));
        }
        let mut items = vec![
            ConfigurationItem::new(
                info.enable_key(),
                ItemValue::Bool(info.mandatory),
                format!("Set to True to let remedy fix: {}", summary(&info)),
            )
            .simple(),
        ];
        if let Some(flat) = spec.data.as_flat() {
            for (key, value) in flat {
                let default = match value {
                    KvValue::Scalar(s) => ItemValue::Str(s.clone()),
                    KvValue::List(l) => ItemValue::List(l.clone()),
                };
                items.push(ConfigurationItem::new(
                    key.clone(),
                    default,
                    format!("Value of {key} in {}", spec.path.display()),
                ));
            }
        }
        Self { info, spec, items }
    }

    pub fn editor_spec(&self) -> &EditorSpec {
        &self.spec
    }

    /// The editor spec with item overrides applied to the desired data.
    fn effective_spec(&self) -> EditorSpec {
        let mut spec = self.spec.clone();
        if let KvData::Flat(flat) = &mut spec.data {
            for (key, value) in flat.iter_mut() {
                let Some(item) = self.items.iter().find(|i| i.key() == key) else {
                    continue;
                };
                *value = match item.value() {
                    ItemValue::List(l) => KvValue::List(l.clone()),
                    other => KvValue::Scalar(other.to_text()),
                };
            }
        }
        spec
    }

    fn editor(&self, runner: Arc<dyn CommandRunner>) -> Result<KeyValueEditor> {
        Ok(KeyValueEditor::new(self.effective_spec(), runner)?)
    }
}

fn summary(info: &RuleInfo) -> &str {
    if info.description.is_empty() {
        &info.name
    } else {
        &info.description
    }
}

fn describe(editor: &KeyValueEditor) -> Vec<String> {
    let path = editor.path().display();
    let mut lines = Vec::new();
    let mut pairs = |data: Option<&KvData>, verb: &str| {
        let Some(data) = data else { return };
        match data {
            KvData::Flat(flat) => {
                for (key, value) in flat {
                    lines.push(format!("{path}: {key} {verb} {}", value.joined()));
                }
            }
            KvData::Tagged(tagged) => {
                for (tag, inner) in tagged {
                    if inner.is_empty() {
                        lines.push(format!("{path}: [{tag}] {verb} the whole block"));
                    }
                    for (key, value) in inner {
                        lines.push(format!("{path}: [{tag}] {key} {verb} {}", value.joined()));
                    }
                }
            }
        }
    };
    pairs(editor.fixables(), "should be");
    pairs(editor.removables(), "must not be");
    for key in editor.duplicates() {
        lines.push(format!("{path}: {key} is set more than once"));
    }
    let others = editor.duplicate_count().saturating_sub(editor.duplicates().len());
    if others > 0 {
        lines.push(format!("{path}: {others} other key(s) are set more than once"));
    }
    lines
}

impl Rule for KeyValueRule {
    fn info(&self) -> &RuleInfo {
        &self.info
    }

    fn items(&self) -> &[ConfigurationItem] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut [ConfigurationItem] {
        &mut self.items
    }

    fn report(&mut self, ctx: &ReportContext<'_>) -> Result<Finding> {
        let mut editor = self.editor(Arc::clone(&ctx.runner))?;
        let validation = editor.validate()?;
        let detail = match &validation {
            Validation::Compliant => Vec::new(),
            Validation::NonCompliant => describe(&editor),
            Validation::Invalid(reason) => vec![reason.clone()],
        };
        Ok(Finding {
            compliance: Compliance::from(validation),
            detail,
        })
    }

    fn fix(&mut self, ctx: &mut FixContext<'_>) -> Result<bool> {
        let mut editor = self.editor(Arc::clone(&ctx.runner))?;
        match editor.validate()? {
            Validation::Compliant => {
                debug!(rule = %self.info.name, "Already compliant");
                return Ok(true);
            }
            Validation::Invalid(reason) => {
                ctx.note(format!("cannot fix: {reason}"));
                return Ok(false);
            }
            Validation::NonCompliant => {}
        }

        if !editor.duplicates().is_empty() {
            ctx.note(format!(
                "{}: collapsing duplicate keys: {}",
                editor.path().display(),
                editor.duplicates().join(", ")
            ));
        }

        let updated = match editor.update() {
            Ok(updated) => updated,
            Err(e) => {
                ctx.record_tool_changes(&editor)?;
                return Err(e.into());
            }
        };
        if !updated {
            ctx.note(format!("{}: some keys could not be applied", editor.path().display()));
        }
        if let Some(diff) = editor.preview() {
            debug!(rule = %self.info.name, "Pending change:\n{diff}");
        }
        let committed = ctx.commit_editor(&mut editor)?;
        Ok(updated && committed)
    }
}
