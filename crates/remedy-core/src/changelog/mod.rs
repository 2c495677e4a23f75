//! Durable record of every mutation a fix performs
//!
//! The change log is persisted as a TOML file after every change, so a
//! crash between two mutations still leaves an undo trail for the first.
//! Loading takes a shared lock. Saving takes an exclusive lock on a
//! `.lock` sidecar next to the log and goes through a temp file and rename.

mod backup;
mod event;

pub use backup::BackupStore;
pub use event::{Event, EventId, EventIds, EventKind};

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use remedy_host::{FileMeta, checksum, io};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Reverses events the change log cannot reverse on its own.
///
/// Rules implement this for package and command events.
pub trait ReverseAction {
    fn reverse(&self, event: &Event) -> Result<bool>;
}

/// A reverse action for rules with nothing domain-specific to undo.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReverse;

impl ReverseAction for NoReverse {
    fn reverse(&self, event: &Event) -> Result<bool> {
        warn!(event = %event.id, kind = event.kind.name(), "No reverse action for event");
        Ok(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    /// Log format version for forward compatibility
    version: String,
    #[serde(default)]
    events: Vec<Event>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            events: Vec::new(),
        }
    }
}

/// The change log plus the backups its `conf` events refer to.
#[derive(Debug)]
pub struct ChangeLog {
    /// `None` keeps the log in memory only
    path: Option<PathBuf>,
    backups: BackupStore,
    doc: Document,
}

impl ChangeLog {
    /// Open the log at `path`; a missing file is an empty log.
    pub fn open(path: &Path, backup_dir: &Path) -> Result<Self> {
        let doc = if path.exists() {
            Self::read_locked(path)?
        } else {
            Document::default()
        };
        debug!(path = %path.display(), events = doc.events.len(), "Opened change log");
        Ok(Self {
            path: Some(path.to_path_buf()),
            backups: BackupStore::new(backup_dir),
            doc,
        })
    }

    /// A log that is never written to disk.
    pub fn in_memory(backup_dir: &Path) -> Self {
        Self {
            path: None,
            backups: BackupStore::new(backup_dir),
            doc: Document::default(),
        }
    }

    fn read_locked(path: &Path) -> Result<Document> {
        let file = File::open(path).map_err(|e| remedy_host::Error::io(path, e))?;
        file.lock_shared()
            .map_err(|_| remedy_host::Error::LockFailed {
                path: path.to_path_buf(),
            })?;

        // Read through the locked handle
        let mut content = String::new();
        (&file)
            .read_to_string(&mut content)
            .map_err(|e| remedy_host::Error::io(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = toml::to_string_pretty(&self.doc)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| remedy_host::Error::io(parent, e))?;
        }
        // The log itself is replaced by rename, so writers serialize on a
        // sidecar that is never replaced.
        let lock_path = lock_path(path);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| remedy_host::Error::io(&lock_path, e))?;
        io::lock_exclusive(&lock_file, &lock_path)?;

        io::write_atomic(path, content.as_bytes())?;
        // Lock released when lock_file is dropped
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn events(&self) -> &[Event] {
        &self.doc.events
    }

    /// Highest id recorded for `rule`.
    pub fn last_id(&self, rule: u32) -> Option<EventId> {
        self.doc
            .events
            .iter()
            .filter(|e| e.rule() == rule)
            .map(|e| e.id)
            .max()
    }

    /// Append an event; ids must increase within a rule.
    pub fn record_event(&mut self, rule: u32, id: EventId, kind: EventKind) -> Result<()> {
        if id.rule != rule {
            return Err(Error::ChangeLog {
                message: format!("event {id} does not belong to rule {rule}"),
            });
        }
        if let Some(last) = self.last_id(rule)
            && id <= last
        {
            return Err(Error::ChangeLog {
                message: format!("event {id} is not after {last}"),
            });
        }
        debug!(event = %id, kind = kind.name(), "Recording event");
        self.doc.events.push(Event::new(id, kind));
        self.save()
    }

    /// Copy `original` aside before it is rewritten under `id`.
    pub fn backup(&self, id: EventId, original: &Path) -> Result<Option<PathBuf>> {
        self.backups.backup(id, original)
    }

    /// Record that `original` was rewritten, with its pre-fix copy in `backup`.
    ///
    /// The checksum of the content now on disk is kept to detect later drift.
    pub fn record_file_change(
        &mut self,
        backup: Option<&Path>,
        original: &Path,
        id: EventId,
        prior: Option<FileMeta>,
    ) -> Result<()> {
        let checksum = if original.exists() {
            Some(checksum::file_checksum(original)?)
        } else {
            None
        };
        self.record_event(
            id.rule,
            id,
            EventKind::Conf {
                path: original.to_path_buf(),
                backup: backup.map(Path::to_path_buf),
                meta: prior,
                checksum,
            },
        )
    }

    /// Events of `rule`, oldest first.
    pub fn find_events_for_rule(&self, rule: u32) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.doc.events.iter().filter(|e| e.rule() == rule).collect();
        events.sort_by_key(|e| e.id);
        events
    }

    /// Remove an event and any backup it owns.
    pub fn delete_event(&mut self, id: EventId) -> Result<()> {
        let pos = self
            .doc
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::EventNotFound { id: id.to_string() })?;
        let event = self.doc.events.remove(pos);
        if let EventKind::Conf {
            backup: Some(backup),
            ..
        } = &event.kind
        {
            self.backups.discard(backup)?;
        }
        self.save()
    }

    /// Drop every event of `rule`, before a new fix cycle.
    pub fn clear_rule(&mut self, rule: u32) -> Result<usize> {
        let ids: Vec<EventId> = self.find_events_for_rule(rule).iter().map(|e| e.id).collect();
        for id in &ids {
            self.delete_event(*id)?;
        }
        if !ids.is_empty() {
            debug!(rule, count = ids.len(), "Discarded stale events");
        }
        Ok(ids.len())
    }

    /// Reverse one event and, on success, delete it.
    ///
    /// Package and command events go to `reverse`; the others are handled
    /// here.
    pub fn undo_event(&mut self, id: EventId, reverse: &dyn ReverseAction) -> Result<bool> {
        let event = self
            .doc
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| Error::EventNotFound { id: id.to_string() })?;

        let reversed = match &event.kind {
            EventKind::Creation { path } => {
                io::remove_file(path)?;
                true
            }
            EventKind::Conf {
                path,
                backup,
                meta,
                checksum,
            } => restore_conf(path, backup.as_deref(), *meta, checksum.as_deref())?,
            EventKind::Permission { path, prior } => {
                prior.apply(path)?;
                true
            }
            EventKind::PackageState { .. } | EventKind::Command { .. } => reverse.reverse(&event)?,
        };

        if reversed {
            info!(event = %id, kind = event.kind.name(), "Reversed event");
            self.delete_event(id)?;
        } else {
            warn!(event = %id, kind = event.kind.name(), "Event could not be reversed");
        }
        Ok(reversed)
    }
}

/// `changelog.toml` locks through `changelog.toml.lock`.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn restore_conf(
    path: &Path,
    backup: Option<&Path>,
    meta: Option<FileMeta>,
    fixed_sum: Option<&str>,
) -> Result<bool> {
    if let Some(expected) = fixed_sum
        && path.exists()
    {
        let current = checksum::file_checksum(path)?;
        if current != expected {
            warn!(path = %path.display(), "File changed since it was fixed; restoring anyway");
        }
    }

    match backup {
        Some(backup) => {
            let content = io::read_bytes(backup)?;
            let temp = io::working_path(path, "undo");
            io::write_atomic_via(path, &temp, &content, meta)?;
        }
        // The fix created the file
        None => io::remove_file(path)?,
    }
    Ok(true)
}
