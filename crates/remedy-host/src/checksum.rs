//! SHA-256 checksum utilities
//!
//! Checksums use the canonical format `sha256:<hex>`. The change log stores
//! one for every file a fix wrote so undo can tell when a file drifted after
//! the fix.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{Error, Result};

const PREFIX: &str = "sha256:";

/// Checksum of in-memory bytes.
pub fn content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Checksum of a file's contents.
pub fn file_checksum(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(content_checksum(&content))
}
