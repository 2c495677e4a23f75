//! Store trait implemented by every dialect

use std::path::{Path, PathBuf};

use remedy_host::{FileMeta, io};

use crate::data::{Intent, KvData, Validation};
use crate::{Error, Result};

/// What a store needs to change to satisfy the desired data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// `Compliant` or `NonCompliant`; parse problems surface earlier as errors
    pub validation: Validation,
    /// Keys (or tags) to add or correct; only filled for `Intent::Present`
    pub fixables: KvData,
    /// Keys (or tags) to strip; only filled for `Intent::NotPresent`
    pub removables: KvData,
    /// Desired keys that occur more than once in the source
    pub duplicates: Vec<String>,
    /// Keys (and tags) occurring more than once anywhere in the source,
    /// desired or not
    pub duplicate_count: usize,
}

impl Reconciliation {
    pub(crate) fn new(fixables: KvData, removables: KvData, duplicates: Vec<String>) -> Self {
        let validation = if fixables.is_empty() && removables.is_empty() && duplicates.is_empty() {
            Validation::Compliant
        } else {
            Validation::NonCompliant
        };
        Self {
            validation,
            fixables,
            removables,
            duplicates,
            duplicate_count: 0,
        }
    }

    /// Only desired keys affect validation; the count is informational.
    pub(crate) fn with_duplicate_count(mut self, count: usize) -> Self {
        self.duplicate_count = count;
        self
    }
}

/// One configuration store in memory.
///
/// File-backed dialects render text that the editor writes atomically;
/// tool-backed dialects apply changes through their tool and render nothing.
pub trait ConfigStore {
    /// Compare the store with `desired` under `intent`.
    fn reconcile(&mut self, desired: &KvData, intent: Intent) -> Result<Reconciliation>;

    /// Apply working sets in memory (or through the backing tool).
    ///
    /// Every key is attempted; the result is false if any of them failed.
    fn apply(&mut self, fixables: &KvData, removables: &KvData) -> Result<bool>;

    /// Serialized content for file-backed stores.
    fn render(&self) -> Option<String> {
        None
    }

    /// Flush to `path` through `working`.
    fn write(&self, path: &Path, working: &Path, meta: Option<FileMeta>) -> Result<()> {
        match self.render() {
            Some(text) => io::write_atomic_via(path, working, text.as_bytes(), meta).map_err(
                |source| Error::FileWrite {
                    path: PathBuf::from(path),
                    source,
                },
            ),
            None => Ok(()),
        }
    }

    /// Commands `apply` ran through a backing tool, in order.
    fn applied_commands(&self) -> Vec<Vec<String>> {
        Vec::new()
    }

    /// Commands that reverse what `apply` did through a backing tool.
    fn undo_commands(&self) -> Vec<Vec<String>> {
        Vec::new()
    }
}
