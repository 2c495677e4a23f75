//! Tool settings read from `remedy.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use remedy_host::io;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Where remedy keeps its state and how it runs commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Change log file
    pub changelog: PathBuf,
    /// Root of the per-rule backup tree
    pub backup_dir: PathBuf,
    /// Persisted `[RuleName]` configuration
    pub rule_config: PathBuf,
    /// Declarative key-value rules
    pub rule_set: PathBuf,
    /// Deadline for each external command, in seconds
    pub timeout_secs: u64,
    pub install_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            changelog: PathBuf::from("/var/lib/remedy/changelog.toml"),
            backup_dir: PathBuf::from("/var/lib/remedy/backups"),
            rule_config: PathBuf::from("/etc/remedy/remedy.conf"),
            rule_set: PathBuf::from("/etc/remedy/rules.toml"),
            timeout_secs: remedy_host::exec::DEFAULT_TIMEOUT.as_secs(),
            install_mode: false,
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub const DEFAULT_PATH: &'static str = "/etc/remedy/remedy.toml";

    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = io::read_text(path)?;
        let settings: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Load settings, or use the defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match io::read_text_optional(path)? {
            Some(content) => Ok(toml::from_str(&content)?),
            None => Ok(Self::default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings: Settings = toml::from_str("timeout_secs = 5\n").unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(5));
        assert_eq!(settings.backup_dir, Settings::default().backup_dir);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("remedy.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
