//! Copies of files taken before a fix rewrites them
//!
//! Layout: `<root>/<rule>/<event id>-<file name>`.

use std::path::{Path, PathBuf};

use remedy_host::io;
use tracing::debug;

use super::EventId;
use crate::Result;

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the backup for `original` under `id` lives.
    pub fn path_for(&self, id: EventId, original: &Path) -> PathBuf {
        let name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.root
            .join(format!("{:04}", id.rule))
            .join(format!("{id}-{name}"))
    }

    /// Copy `original` aside; `None` when there is nothing to copy.
    pub fn backup(&self, id: EventId, original: &Path) -> Result<Option<PathBuf>> {
        if !original.exists() {
            return Ok(None);
        }
        let dest = self.path_for(id, original);
        io::copy_file(original, &dest)?;
        debug!(original = %original.display(), backup = %dest.display(), "Backed up file");
        Ok(Some(dest))
    }

    /// Drop a backup that is no longer referenced.
    pub fn discard(&self, backup: &Path) -> Result<()> {
        io::remove_file(backup)?;
        Ok(())
    }
}
