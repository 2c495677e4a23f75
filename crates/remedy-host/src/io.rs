//! Atomic I/O operations with file locking
//!
//! Targets are never truncated in place: content goes to a sibling temp file,
//! is flushed, receives the final metadata, and is then renamed over the
//! target. A crash leaves either the old or the new file, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoff;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::{Error, FileMeta, Result};

/// How long to keep retrying a contended advisory lock.
const LOCK_PATIENCE: Duration = Duration::from_secs(2);

/// Derive the working temp path for `target`, owned by `owner`.
///
/// The owner tag (usually a rule id) keeps two editors on the same file from
/// sharing a temp file. The temp file lives next to the target so the final
/// rename stays on one filesystem.
pub fn working_path(target: &Path, owner: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let owner: String = owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    target.with_file_name(format!(".{}.{}.{}.tmp", name, owner, std::process::id()))
}

/// Write content atomically to a file, keeping its metadata.
///
/// If the target already exists its mode, owner and group are carried over
/// to the replacement.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let temp = working_path(path, "remedy");
    write_atomic_via(path, &temp, content, None)
}

/// Write content to `temp` and atomically move it onto `path`.
///
/// `meta` overrides the metadata of the result. With `None` the metadata of
/// the existing target is preserved; a new file keeps the process defaults.
pub fn write_atomic_via(
    path: &Path,
    temp: &Path,
    content: &[u8],
    meta: Option<FileMeta>,
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let wanted = match meta {
        Some(meta) => Some(meta),
        None => FileMeta::read_optional(path)?,
    };

    let result = write_temp(path, temp, content, wanted);
    if result.is_err() && temp.exists() {
        if let Err(e) = fs::remove_file(temp) {
            warn!(temp = %temp.display(), error = %e, "Could not remove temp file");
        }
    }
    result?;

    fs::rename(temp, path).map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "Atomic write complete");
    Ok(())
}

fn write_temp(path: &Path, temp: &Path, content: &[u8], meta: Option<FileMeta>) -> Result<()> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp)
        .map_err(|e| Error::io(temp, e))?;

    lock_exclusive(&temp_file, path)?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(temp, e))?;
    temp_file.sync_all().map_err(|e| Error::io(temp, e))?;

    if let Some(meta) = meta {
        meta.apply(temp)?;
    }

    temp_file
        .unlock()
        .map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })
}

/// Take an exclusive advisory lock, retrying with backoff while contended.
pub fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    let policy = ExponentialBackoff {
        max_elapsed_time: Some(LOCK_PATIENCE),
        ..Default::default()
    };
    backoff::retry(policy, || {
        file.try_lock_exclusive()
            .map_err(backoff::Error::transient)
    })
    .map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read text content, returning `None` when the file does not exist.
pub fn read_text_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Read raw bytes, for content that need not be UTF-8.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Read raw bytes, returning `None` when the file does not exist.
pub fn read_bytes_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Copy `source` to `dest`, creating parents and keeping the source's mode.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| Error::io(source, e))?;
    Ok(())
}

/// Remove a file; a file that is already gone is not an error.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
