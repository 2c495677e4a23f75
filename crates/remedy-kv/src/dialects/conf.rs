//! Flat `key value` files (sshd_config, sysctl.conf, login.defs, ...)

use std::path::{Path, PathBuf};

use remedy_host::io;
use tracing::debug;

use super::lines::{self, Line};
use crate::data::{Intent, KvData, Separator};
use crate::store::{ConfigStore, Reconciliation};
use crate::{Error, Result};

/// A flat configuration file held as lines.
#[derive(Debug, Clone)]
pub struct ConfStore {
    path: PathBuf,
    separator: Separator,
    lines: Vec<Line>,
    existed: bool,
}

impl ConfStore {
    /// Load `path`; a missing file is an empty store.
    pub fn load(path: &Path, separator: Separator) -> Result<Self> {
        let text = io::read_text_optional(path).map_err(|source| Error::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        let existed = text.is_some();
        let mut store = Self::parse(path, text.as_deref().unwrap_or(""), separator)?;
        store.existed = existed;
        debug!(path = %path.display(), lines = store.lines.len(), existed, "Loaded conf store");
        Ok(store)
    }

    /// Parse `text` as if read from `path`.
    pub fn parse(path: &Path, text: &str, separator: Separator) -> Result<Self> {
        let mut parsed = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if lines::is_ignorable(trimmed) {
                parsed.push(Line::Verbatim(raw.to_string()));
                continue;
            }
            match separator.split(trimmed) {
                Some((key, value)) => parsed.push(Line::parsed(key, value, raw)),
                None => {
                    return Err(Error::parse(
                        path,
                        idx + 1,
                        format!("expected {}", separator.join("key", "value")),
                    ));
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            separator,
            lines: parsed,
            existed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Values of every occurrence of `key`, in file order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        lines::values(&self.lines, key)
    }
}

impl ConfigStore for ConfStore {
    fn reconcile(&mut self, desired: &KvData, intent: Intent) -> Result<Reconciliation> {
        let desired = desired
            .as_flat()
            .ok_or_else(|| Error::Validation("conf data must be flat".into()))?;
        let (fixes, removes, duplicates) = lines::check_flat(&self.lines, desired, intent);
        Ok(Reconciliation::new(
            KvData::Flat(fixes),
            KvData::Flat(removes),
            duplicates,
        )
        .with_duplicate_count(lines::duplicate_keys(&self.lines).len()))
    }

    fn apply(&mut self, fixables: &KvData, removables: &KvData) -> Result<bool> {
        let empty = Default::default();
        let fixes = fixables.as_flat().unwrap_or(&empty);
        let removes = removables.as_flat().unwrap_or(&empty);
        lines::apply_flat(&mut self.lines, fixes, removes, |l| l.len());
        Ok(true)
    }

    fn render(&self) -> Option<String> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render(self.separator));
            out.push('\n');
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store(text: &str, sep: Separator) -> ConfStore {
        ConfStore::parse(Path::new("/etc/test.conf"), text, sep).unwrap()
    }

    #[test]
    fn unrelated_duplicates_are_counted_not_flagged() {
        let mut s = store("a=1\nb=2\nb=2\nc=3\nc=4\n", Separator::ClosedEquals);
        let rec = s
            .reconcile(&KvData::flat([("a", "1")]), Intent::Present)
            .unwrap();
        assert_eq!(rec.validation, crate::Validation::Compliant);
        assert_eq!(rec.duplicate_count, 2);
    }

    #[test]
    fn comments_and_untouched_lines_survive() {
        let mut s = store("# header\nPort 22\n\nPermitRootLogin yes\n", Separator::Space);
        let desired = KvData::flat([("PermitRootLogin", "no")]);
        let rec = s.reconcile(&desired, Intent::Present).unwrap();
        s.apply(&rec.fixables, &rec.removables).unwrap();
        assert_eq!(
            s.render().unwrap(),
            "# header\nPort 22\n\nPermitRootLogin no\n"
        );
    }

    #[test]
    fn missing_separator_reports_line_number() {
        let err = ConfStore::parse(
            Path::new("/etc/sysctl.conf"),
            "a = 1\n# ok\nbroken line\n",
            Separator::OpenEquals,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "{err}");
    }

    #[test]
    fn new_keys_are_appended() {
        let mut s = store("a=1\n# trailing\n", Separator::ClosedEquals);
        let rec = s
            .reconcile(&KvData::flat([("b", "2")]), Intent::Present)
            .unwrap();
        s.apply(&rec.fixables, &rec.removables).unwrap();
        assert_eq!(s.render().unwrap(), "a=1\n# trailing\nb=2\n");
    }

    #[test]
    fn notpresent_strips_only_matching_lines() {
        let mut s = store("Ciphers aes128-cbc\nCiphers aes256-ctr\n", Separator::Space);
        let banned = KvData::flat([("Ciphers", "aes128-cbc")]);
        let rec = s.reconcile(&banned, Intent::NotPresent).unwrap();
        assert!(rec.fixables.is_empty());
        s.apply(&rec.fixables, &rec.removables).unwrap();
        assert_eq!(s.values("Ciphers"), vec!["aes256-ctr"]);
    }

    #[test]
    fn tagged_data_is_rejected() {
        let mut s = store("", Separator::Space);
        let err = s
            .reconcile(&KvData::tag("t", [("k", "v")]), Intent::Present)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
