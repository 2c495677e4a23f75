//! Facts about the host that applicability checks and fixes consult

use std::path::Path;
use std::sync::Arc;

use remedy_host::{CommandRunner, exec::argv, io};
use tracing::debug;

use crate::Result;

/// OS identity and run mode.
pub trait Environment {
    /// Broad family: `linux`, `darwin`, `solaris`, `freebsd`
    fn os_family(&self) -> &str;
    /// Distribution or product name, e.g. `Mac OS X`, `Red Hat Enterprise Linux`
    fn os_type(&self) -> &str;
    fn os_version(&self) -> &str;
    /// True while building an image; fixes skip service starts
    fn is_install_mode(&self) -> bool;
    fn is_root(&self) -> bool;
}

/// Fixed answers, for tests and for hosts described on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticEnvironment {
    pub family: String,
    pub os_type: String,
    pub version: String,
    pub install_mode: bool,
    pub root: bool,
}

impl StaticEnvironment {
    pub fn new(family: &str, os_type: &str, version: &str) -> Self {
        Self {
            family: family.to_string(),
            os_type: os_type.to_string(),
            version: version.to_string(),
            install_mode: false,
            root: true,
        }
    }

    pub fn with_root(mut self, root: bool) -> Self {
        self.root = root;
        self
    }

    pub fn with_install_mode(mut self, install_mode: bool) -> Self {
        self.install_mode = install_mode;
        self
    }

    /// Probe the running host.
    ///
    /// macOS answers through `sw_vers`; everything else through
    /// `/etc/os-release`, falling back to `uname`.
    pub fn detect(runner: &Arc<dyn CommandRunner>, install_mode: bool) -> Result<Self> {
        let family = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };

        let (os_type, version) = if family == "darwin" {
            (
                first_line(runner, &["sw_vers", "-productName"])?,
                first_line(runner, &["sw_vers", "-productVersion"])?,
            )
        } else {
            match io::read_text_optional(Path::new("/etc/os-release"))? {
                Some(text) => parse_os_release(&text),
                None => (
                    first_line(runner, &["uname", "-s"])?,
                    first_line(runner, &["uname", "-r"])?,
                ),
            }
        };

        let root = first_line(runner, &["id", "-u"])? == "0";
        let env = Self {
            family: family.to_string(),
            os_type,
            version,
            install_mode,
            root,
        };
        debug!(?env, "Detected environment");
        Ok(env)
    }
}

impl Environment for StaticEnvironment {
    fn os_family(&self) -> &str {
        &self.family
    }

    fn os_type(&self) -> &str {
        &self.os_type
    }

    fn os_version(&self) -> &str {
        &self.version
    }

    fn is_install_mode(&self) -> bool {
        self.install_mode
    }

    fn is_root(&self) -> bool {
        self.root
    }
}

fn first_line(runner: &Arc<dyn CommandRunner>, cmd: &[&str]) -> Result<String> {
    let out = runner.execute(&argv(cmd))?;
    Ok(out.stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// `NAME` and `VERSION_ID` from os-release text.
pub(crate) fn parse_os_release(text: &str) -> (String, String) {
    let mut name = String::new();
    let mut version = String::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "NAME" => name = value,
            "VERSION_ID" => version = value,
            _ => {}
        }
    }
    (name, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_release_fields_are_unquoted() {
        let text = "NAME=\"Red Hat Enterprise Linux\"\nVERSION_ID=\"9.2\"\nID=rhel\n";
        assert_eq!(
            parse_os_release(text),
            ("Red Hat Enterprise Linux".to_string(), "9.2".to_string())
        );
    }
}
