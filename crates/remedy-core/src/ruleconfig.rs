//! Persisted, human-editable rule configuration
//!
//! ```text
//! [MAIN]
//! version = 1
//!
//! [DisableRootSsh]
//! # Set to False to skip this fix
//! DISABLEROOTSSH = True
//! UCDISABLEROOTSSH = approved by change board
//! ```
//!
//! `UC<key>` lines carry the operator's comment for `<key>`. The parser keeps
//! every line under its literal key; whether `UC<key>` is a comment or an
//! item of its own is settled against the rule's declared items, so a rule
//! may declare both `MASK` and `UCMASK`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use remedy_host::{FileMeta, io};
use tracing::{debug, info};

use crate::item::ConfigurationItem;
use crate::{Error, Result};

/// Schema version written to `[MAIN]`.
pub const CONFIG_VERSION: &str = "1";

const MAIN: &str = "MAIN";
const COMMENT_PREFIX: &str = "UC";
const CONFIG_MODE: u32 = 0o644;

/// Which items the writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigView {
    #[default]
    Full,
    /// Only items flagged simple
    Simple,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entry {
    value: String,
    comment: Option<String>,
    instructions: String,
    simple: bool,
}

/// Every rule section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    version: String,
    sections: BTreeMap<String, BTreeMap<String, Entry>>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            sections: BTreeMap::new(),
        }
    }
}

impl RuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration; a missing file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let text = io::read_text_optional(path)?.ok_or_else(|| Error::ConfigNotFound {
            path: path.to_path_buf(),
        })?;
        let config = Self::parse(path, &text)?;
        debug!(path = %path.display(), sections = config.sections.len(), "Loaded rule config");
        Ok(config)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut config = Self {
            version: String::new(),
            sections: BTreeMap::new(),
        };
        let mut current: Option<String> = None;
        let error = |line: usize, message: &str| Error::ConfigParse {
            path: PathBuf::from(path),
            line,
            message: message.to_string(),
        };

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim();
                if name.is_empty() {
                    return Err(error(idx + 1, "empty section name"));
                }
                if name != MAIN {
                    config.sections.entry(name.to_string()).or_default();
                }
                current = Some(name.to_string());
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| error(idx + 1, "expected key = value"))?;
            if key.is_empty() {
                return Err(error(idx + 1, "empty key"));
            }
            let Some(section) = current.as_deref() else {
                return Err(error(idx + 1, "entry outside of any section"));
            };

            if section == MAIN {
                if key == "version" {
                    config.version = value.to_string();
                }
                continue;
            }

            config
                .sections
                .entry(section.to_string())
                .or_default()
                .entry(key.to_string())
                .or_default()
                .value = value.to_string();
        }

        if config.version.is_empty() {
            return Err(error(0, "missing [MAIN] version"));
        }
        Ok(config)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rule names with a section, sorted.
    pub fn rules(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    /// Raw value of `key`; an empty value is still a value.
    pub fn value(&self, rule: &str, key: &str) -> Option<&str> {
        self.sections
            .get(rule)?
            .get(key)
            .map(|e| e.value.as_str())
    }

    /// Operator comment for `key`, recorded or read from its `UC<key>` line.
    pub fn comment(&self, rule: &str, key: &str) -> Option<&str> {
        let entries = self.sections.get(rule)?;
        if let Some(comment) = entries.get(key).and_then(|e| e.comment.as_deref()) {
            return Some(comment);
        }
        entries.get(&comment_key(key)).map(|e| e.value.as_str())
    }

    /// Set one raw value, as `remedy config set` does.
    pub fn set_value(&mut self, rule: &str, key: &str, value: &str) {
        self.sections
            .entry(rule.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .value = value.to_string();
    }

    /// Overwrite `items` with what the file says for `rule`.
    ///
    /// Every key present in the file is applied, empty or not, and the
    /// item's datatype decides whether the text is acceptable.
    pub fn apply(&self, rule: &str, items: &mut [ConfigurationItem]) -> Result<()> {
        let Some(entries) = self.sections.get(rule) else {
            return Ok(());
        };
        let declared: Vec<String> = items.iter().map(|i| i.key().to_string()).collect();
        for item in items.iter_mut() {
            let Some(entry) = entries.get(item.key()) else {
                continue;
            };
            item.set_from_text(&entry.value)?;

            let uc = comment_key(item.key());
            let comment = match &entry.comment {
                Some(comment) => Some(comment.as_str()),
                None if !declared.contains(&uc) => entries.get(&uc).map(|e| e.value.as_str()),
                None => None,
            };
            if let Some(comment) = comment {
                item.user_comment = comment.to_string();
            }
        }
        Ok(())
    }

    /// Capture the current state of `items` for `rule`.
    pub fn record(&mut self, rule: &str, items: &[ConfigurationItem]) {
        let declared: Vec<&str> = items.iter().map(|i| i.key()).collect();
        let entries = self.sections.entry(rule.to_string()).or_default();
        for item in items {
            let uc = comment_key(item.key());
            let entry = entries.entry(item.key().to_string()).or_default();
            entry.value = item.value().to_text();
            entry.instructions = item.instructions.clone();
            entry.simple = item.simple;
            if declared.contains(&uc.as_str()) {
                // The comment line would collide with the item of that name
                if !item.user_comment.is_empty() {
                    debug!(rule, key = item.key(), "Comment not persisted; {uc} is an item");
                }
                entry.comment = None;
            } else {
                entry.comment = Some(item.user_comment.clone()).filter(|c| !c.is_empty());
                entries.remove(&uc);
            }
        }
    }

    pub fn render(&self, view: ConfigView) -> String {
        let mut out = format!("[{MAIN}]\nversion = {}\n", self.version);
        for (rule, entries) in &self.sections {
            let shown: Vec<(&String, &Entry)> = entries
                .iter()
                .filter(|(_, e)| view == ConfigView::Full || e.simple)
                .collect();
            if shown.is_empty() {
                continue;
            }
            out.push_str(&format!("\n[{rule}]\n"));
            for (key, entry) in shown {
                for line in entry.instructions.lines() {
                    out.push_str(&format!("# {line}\n"));
                }
                out.push_str(&format!("{key} = {}\n", entry.value));
                if let Some(comment) = &entry.comment {
                    out.push_str(&format!("{COMMENT_PREFIX}{key} = {comment}\n"));
                }
            }
        }
        out
    }

    /// Write atomically with mode 0644.
    pub fn save(&self, path: &Path, view: ConfigView) -> Result<()> {
        io::write_atomic(path, self.render(view).as_bytes())?;
        let meta = FileMeta::read(path)?;
        if meta.mode != CONFIG_MODE {
            meta.with_mode(CONFIG_MODE).apply(path)?;
        }
        info!(path = %path.display(), "Saved rule config");
        Ok(())
    }
}

fn comment_key(key: &str) -> String {
    format!("{COMMENT_PREFIX}{key}")
}
