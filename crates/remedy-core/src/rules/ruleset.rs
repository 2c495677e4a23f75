//! Declarative key-value rules read from `rules.toml`
//!
//! ```toml
//! [[rule]]
//! id = 7
//! name = "AslrEnabled"
//! dialect = "conf"
//! path = "/etc/sysctl.conf"
//! separator = "openeq"
//! mandatory = true
//! root_required = true
//!
//! [rule.data]
//! "kernel.randomize_va_space" = "2"
//!
//! [rule.applicability]
//! type = "white"
//! family = ["linux"]
//! ```

use std::path::{Path, PathBuf};

use remedy_host::io;
use remedy_kv::{Dialect, EditorSpec, Intent, KvData, Separator};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::applicability::Applicability;
use super::keyvalue::KeyValueRule;
use super::rule::RuleInfo;
use crate::Result;

/// One `[[rule]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub dialect: Dialect,
    /// File path, or preference domain for `defaults`
    pub path: PathBuf,
    #[serde(default)]
    pub separator: Separator,
    #[serde(default)]
    pub intent: Intent,
    pub data: KvData,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub root_required: bool,
    #[serde(default)]
    pub applicability: Applicability,
}

impl RuleSpec {
    pub fn info(&self) -> RuleInfo {
        RuleInfo {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            mandatory: self.mandatory,
            root_required: self.root_required,
            applicability: self.applicability.clone(),
        }
    }

    pub fn editor_spec(&self) -> EditorSpec {
        EditorSpec::new(self.dialect, &self.path, self.data.clone())
            .with_intent(self.intent)
            .with_separator(self.separator)
    }

    pub fn build(&self) -> KeyValueRule {
        KeyValueRule::new(self.info(), self.editor_spec())
    }
}

/// The contents of a rule set file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load the rule set; a missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(text) = io::read_text_optional(path)? else {
            debug!(path = %path.display(), "No rule set file");
            return Ok(Self::default());
        };
        let set = Self::parse(&text)?;
        debug!(path = %path.display(), rules = set.rules.len(), "Loaded rule set");
        Ok(set)
    }
}
