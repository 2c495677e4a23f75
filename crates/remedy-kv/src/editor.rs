//! Validate / update / commit over one configuration store

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use remedy_host::{CommandRunner, FileMeta, io};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Intent, KvData, Separator, Validation};
use crate::dialects::{ConfStore, DefaultsStore, ProfilesStore, TagConfStore};
use crate::store::{ConfigStore, Reconciliation};
use crate::{Error, Result, diff};

/// Which store grammar an editor speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Conf,
    TagConf,
    Defaults,
    Profiles,
}

impl Dialect {
    /// Whether desired data for this dialect is tagged.
    pub fn is_tagged(&self) -> bool {
        matches!(self, Self::TagConf | Self::Profiles)
    }

    /// Whether the store is a file the editor rewrites.
    pub fn is_file_backed(&self) -> bool {
        matches!(self, Self::Conf | Self::TagConf)
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conf" => Ok(Self::Conf),
            "tagconf" => Ok(Self::TagConf),
            "defaults" => Ok(Self::Defaults),
            "profiles" => Ok(Self::Profiles),
            other => Err(Error::Validation(format!("unknown dialect {other:?}"))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conf => "conf",
            Self::TagConf => "tagconf",
            Self::Defaults => "defaults",
            Self::Profiles => "profiles",
        };
        f.write_str(name)
    }
}

/// Everything an editor needs to know about its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSpec {
    pub dialect: Dialect,
    /// File path, or preference domain for `defaults`
    pub path: PathBuf,
    /// Temp file used for the atomic write; derived from `path` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_path: Option<PathBuf>,
    pub data: KvData,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub separator: Separator,
}

impl EditorSpec {
    pub fn new(dialect: Dialect, path: impl Into<PathBuf>, data: KvData) -> Self {
        Self {
            dialect,
            path: path.into(),
            working_path: None,
            data,
            intent: Intent::Present,
            separator: Separator::default(),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_working_path(mut self, working_path: impl Into<PathBuf>) -> Self {
        self.working_path = Some(working_path.into());
        self
    }

    /// Reject data the dialect cannot represent.
    pub fn check(&self) -> Result<()> {
        let sep = self.separator;
        let check_key = |key: &str| {
            if sep.accepts_key(key) {
                Ok(())
            } else {
                Err(Error::Validation(format!(
                    "key {key:?} cannot be written to {}",
                    self.path.display()
                )))
            }
        };

        match (&self.data, self.dialect.is_tagged()) {
            (KvData::Flat(map), false) => {
                for (key, value) in map {
                    check_key(key)?;
                    value.check(key)?;
                }
            }
            (KvData::Tagged(map), true) => {
                for (tag, inner) in map {
                    if tag.trim().is_empty() || tag.contains(['[', ']', '\n']) {
                        return Err(Error::Validation(format!("invalid tag {tag:?}")));
                    }
                    for (key, value) in inner {
                        if self.dialect == Dialect::TagConf {
                            check_key(key)?;
                        }
                        value.check(key)?;
                    }
                }
            }
            (_, tagged) => {
                return Err(Error::Validation(format!(
                    "{} data must be {}",
                    self.dialect,
                    if tagged { "tagged" } else { "flat" }
                )));
            }
        }
        Ok(())
    }
}

/// Edits one store toward desired data.
///
/// `validate` reloads the store and computes the working sets, `update`
/// applies them in memory (or through the backing tool) and `commit` writes
/// the result. Nothing touches disk before `commit`.
pub struct KeyValueEditor {
    spec: EditorSpec,
    working_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    store: Option<Box<dyn ConfigStore>>,
    reconciliation: Option<Reconciliation>,
    before: Option<String>,
    updated: bool,
    existed: bool,
    meta: Option<FileMeta>,
}

impl fmt::Debug for KeyValueEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueEditor")
            .field("spec", &self.spec)
            .field("working_path", &self.working_path)
            .field("reconciliation", &self.reconciliation)
            .field("updated", &self.updated)
            .finish()
    }
}

impl KeyValueEditor {
    /// Create an editor, failing fast on data the dialect cannot hold.
    pub fn new(spec: EditorSpec, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        spec.check()?;
        let working_path = spec
            .working_path
            .clone()
            .unwrap_or_else(|| io::working_path(&spec.path, "remedy"));
        Ok(Self {
            spec,
            working_path,
            runner,
            store: None,
            reconciliation: None,
            before: None,
            updated: false,
            existed: false,
            meta: None,
        })
    }

    pub fn spec(&self) -> &EditorSpec {
        &self.spec
    }

    pub fn path(&self) -> &Path {
        &self.spec.path
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    /// Force the metadata of the committed file.
    pub fn set_meta(&mut self, meta: FileMeta) {
        self.meta = Some(meta);
    }

    /// Whether the target existed at the last `validate`.
    pub fn target_existed(&self) -> bool {
        self.existed
    }

    fn load(&mut self) -> Result<Box<dyn ConfigStore>> {
        let path = self.spec.path.as_path();
        let sep = self.spec.separator;
        let (store, existed): (Box<dyn ConfigStore>, bool) = match self.spec.dialect {
            Dialect::Conf => {
                let store = ConfStore::load(path, sep)?;
                let existed = store.existed();
                (Box::new(store), existed)
            }
            Dialect::TagConf => {
                let store = TagConfStore::load(path, sep)?;
                let existed = store.existed();
                (Box::new(store), existed)
            }
            Dialect::Defaults => (
                Box::new(DefaultsStore::open(path, Arc::clone(&self.runner))),
                true,
            ),
            Dialect::Profiles => (
                Box::new(ProfilesStore::load(Arc::clone(&self.runner))?),
                true,
            ),
        };
        self.existed = existed;
        Ok(store)
    }

    /// Reload the store and compare it with the desired data.
    ///
    /// A store that does not parse is reported as `Invalid`, not as an
    /// error.
    pub fn validate(&mut self) -> Result<Validation> {
        self.store = None;
        self.reconciliation = None;
        self.updated = false;

        let mut store = match self.load() {
            Ok(store) => store,
            Err(e @ Error::Parse { .. }) => {
                debug!(path = %self.spec.path.display(), error = %e, "Store does not parse");
                return Ok(Validation::Invalid(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let rec = store.reconcile(&self.spec.data, self.spec.intent)?;
        debug!(
            path = %self.spec.path.display(),
            dialect = %self.spec.dialect,
            intent = %self.spec.intent,
            fixables = rec.fixables.len(),
            removables = rec.removables.len(),
            duplicates = rec.duplicates.len(),
            duplicate_count = rec.duplicate_count,
            "Validated store"
        );
        let validation = rec.validation.clone();
        self.before = store.render();
        self.store = Some(store);
        self.reconciliation = Some(rec);
        Ok(validation)
    }

    /// Apply the working sets from the last `validate`.
    ///
    /// Returns false if any key could not be applied.
    pub fn update(&mut self) -> Result<bool> {
        let (Some(store), Some(rec)) = (self.store.as_mut(), self.reconciliation.as_ref()) else {
            return Err(Error::Validation(
                "update requires a successful validate".into(),
            ));
        };
        let ok = store.apply(&rec.fixables, &rec.removables)?;
        self.updated = true;
        Ok(ok)
    }

    /// Write the updated store to its target.
    pub fn commit(&mut self) -> Result<bool> {
        if !self.updated {
            return Err(Error::Validation("commit requires update".into()));
        }
        let Some(store) = self.store.as_ref() else {
            return Err(Error::Validation("commit requires update".into()));
        };

        let after = store.render();
        if after.is_some() && after != self.before {
            store.write(&self.spec.path, &self.working_path, self.meta)?;
            info!(path = %self.spec.path.display(), "Committed store");
        }
        self.before = after;

        if let Some(rec) = self.reconciliation.as_mut() {
            rec.fixables = rec.fixables.emptied();
            rec.removables = rec.removables.emptied();
        }
        self.updated = false;
        Ok(true)
    }

    /// Unified diff of what `commit` would write, after `update`.
    pub fn preview(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        let after = store.render()?;
        let before = self.before.as_deref().unwrap_or("");
        diff::unified(&self.spec.path, before, &after)
    }

    pub fn fixables(&self) -> Option<&KvData> {
        self.reconciliation.as_ref().map(|r| &r.fixables)
    }

    pub fn removables(&self) -> Option<&KvData> {
        self.reconciliation.as_ref().map(|r| &r.removables)
    }

    /// Desired keys that were duplicated in the source at the last validate.
    pub fn duplicates(&self) -> &[String] {
        self.reconciliation
            .as_ref()
            .map(|r| r.duplicates.as_slice())
            .unwrap_or_default()
    }

    /// Keys repeated anywhere in the source at the last validate.
    pub fn duplicate_count(&self) -> usize {
        self.reconciliation
            .as_ref()
            .map(|r| r.duplicate_count)
            .unwrap_or_default()
    }

    /// Commands run through a backing tool since the last validate.
    pub fn applied_commands(&self) -> Vec<Vec<String>> {
        self.store
            .as_ref()
            .map(|s| s.applied_commands())
            .unwrap_or_default()
    }

    /// Commands reversing changes made through a backing tool.
    pub fn undo_commands(&self) -> Vec<Vec<String>> {
        self.store
            .as_ref()
            .map(|s| s.undo_commands())
            .unwrap_or_default()
    }
}
