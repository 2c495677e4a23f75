//! [`TestHost`] sandbox for rule and editor scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory laid out like a small host:
///
/// - `etc/` for target configuration files
/// - `var/changelog.toml` for the change log
/// - `var/backups/` for backup copies
pub struct TestHost {
    temp_dir: TempDir,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("etc")).unwrap();
        fs::create_dir_all(temp_dir.path().join("var")).unwrap();
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of a file under `etc/`.
    pub fn etc(&self, name: &str) -> PathBuf {
        self.root().join("etc").join(name)
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.root().join("var").join("changelog.toml")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root().join("var").join("backups")
    }

    /// Write a file under `etc/` and return its path.
    pub fn write_etc(&self, name: &str, content: &str) -> PathBuf {
        let path = self.etc(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("TestHost::read {}: {e}", path.display()))
    }
}
