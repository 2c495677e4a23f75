//! Permission bits and ownership of a file

use std::fs::{self, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Mask covering permission bits plus setuid/setgid/sticky.
const MODE_MASK: u32 = 0o7777;

/// Mode, owner and group of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMeta {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileMeta {
    pub fn new(mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            mode: mode & MODE_MASK,
            uid,
            gid,
        }
    }

    /// Read the metadata of an existing file.
    pub fn read(path: &Path) -> Result<Self> {
        let md = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(md.mode(), md.uid(), md.gid()))
    }

    /// Read metadata, returning `None` when the file does not exist.
    pub fn read_optional(path: &Path) -> Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(md) => Ok(Some(Self::new(md.mode(), md.uid(), md.gid()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Copy with a different mode.
    pub fn with_mode(self, mode: u32) -> Self {
        Self {
            mode: mode & MODE_MASK,
            ..self
        }
    }

    /// Apply mode and ownership to `path`.
    ///
    /// `chown` is only issued when owner or group differ, so unprivileged
    /// callers can still restore metadata on files they already own.
    pub fn apply(&self, path: &Path) -> Result<()> {
        let current = Self::read(path)?;

        if current.uid != self.uid || current.gid != self.gid {
            debug!(path = %path.display(), uid = self.uid, gid = self.gid, "chown");
            std::os::unix::fs::chown(path, Some(self.uid), Some(self.gid))
                .map_err(|e| Error::io(path, e))?;
        }

        if current.mode != self.mode {
            debug!(path = %path.display(), mode = format!("{:o}", self.mode), "chmod");
            fs::set_permissions(path, Permissions::from_mode(self.mode))
                .map_err(|e| Error::io(path, e))?;
        }

        Ok(())
    }
}

impl std::fmt::Display for FileMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04o} {}:{}", self.mode, self.uid, self.gid)
    }
}
