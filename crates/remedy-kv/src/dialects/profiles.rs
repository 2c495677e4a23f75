//! Installed configuration profiles, read through `profiles -P -v`
//!
//! Profiles are installed by management tooling, not edited in place, so
//! this store only reports. Applying any change fails softly.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use remedy_host::{CommandRunner, exec::argv};
use tracing::{debug, warn};

use super::lines;
use crate::data::{FlatData, Intent, KvData, TaggedData};
use crate::store::{ConfigStore, Reconciliation};
use crate::{Error, Result};

static ATTRIBUTE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\[(\d+)\]\s+attribute:\s*([^:]+):\s*(.*)$")
        .expect("Invalid profile attribute regex")
});

const IDENTIFIER: &str = "profileIdentifier";

/// Profiles by identifier, each with its printed attributes.
pub struct ProfilesStore {
    runner: Arc<dyn CommandRunner>,
    profiles: TaggedData,
}

impl std::fmt::Debug for ProfilesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilesStore")
            .field("profiles", &self.profiles)
            .finish()
    }
}

impl ProfilesStore {
    /// Query the installed profiles.
    pub fn load(runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let cmd = argv(&["profiles", "-P", "-v"]);
        let out = runner.execute(&cmd)?;
        if !out.success() {
            return Err(Error::ExternalTool {
                command: cmd.join(" "),
                code: out.code(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        let profiles = parse_listing(&out.stdout);
        debug!(count = profiles.len(), "Loaded installed profiles");
        Ok(Self { runner, profiles })
    }

    pub fn profiles(&self) -> &TaggedData {
        &self.profiles
    }

    /// Re-query, for callers holding a store across changes made elsewhere.
    pub fn refresh(&mut self) -> Result<()> {
        let fresh = Self::load(Arc::clone(&self.runner))?;
        self.profiles = fresh.profiles;
        Ok(())
    }
}

/// Group attribute lines by (scope, index) and key each group by its
/// profile identifier. Groups without an identifier are dropped.
pub(crate) fn parse_listing(stdout: &str) -> TaggedData {
    let mut groups: BTreeMap<(String, u32), FlatData> = BTreeMap::new();
    for line in stdout.lines() {
        let Some(caps) = ATTRIBUTE_LINE.captures(line.trim()) else {
            continue;
        };
        let idx: u32 = caps[2].parse().unwrap_or_default();
        groups
            .entry((caps[1].to_string(), idx))
            .or_default()
            .insert(caps[3].trim().to_string(), caps[4].trim().into());
    }

    groups
        .into_values()
        .filter_map(|attrs| {
            let id = attrs.get(IDENTIFIER)?.joined();
            Some((id, attrs))
        })
        .collect()
}

/// Wanted attributes that are missing or wrong (present), or that match
/// (notpresent).
fn check_attributes(installed: &FlatData, wanted: &FlatData, intent: Intent) -> FlatData {
    let mut out = FlatData::new();
    for (key, want) in wanted {
        let found = installed.get(key).map(|v| v.joined());
        let found: Vec<&str> = found.as_deref().into_iter().collect();
        let check = lines::check_key(&found, want, intent);
        if let Some(value) = check.fix.or(check.remove) {
            out.insert(key.clone(), value);
        }
    }
    out
}

impl ConfigStore for ProfilesStore {
    fn reconcile(&mut self, desired: &KvData, intent: Intent) -> Result<Reconciliation> {
        let desired = desired
            .as_tagged()
            .ok_or_else(|| Error::Validation("profiles data must be tagged".into()))?;

        let mut fixes = TaggedData::new();
        let mut removes = TaggedData::new();
        for (id, wanted) in desired {
            let installed = self.profiles.get(id);
            match (intent, installed) {
                (Intent::Present, None) => {
                    fixes.insert(id.clone(), wanted.clone());
                }
                (Intent::Present, Some(attrs)) => {
                    let wrong = check_attributes(attrs, wanted, intent);
                    if !wrong.is_empty() {
                        fixes.insert(id.clone(), wrong);
                    }
                }
                (Intent::NotPresent, None) => {}
                (Intent::NotPresent, Some(_)) if wanted.is_empty() => {
                    removes.insert(id.clone(), FlatData::new());
                }
                (Intent::NotPresent, Some(attrs)) => {
                    let hits = check_attributes(attrs, wanted, intent);
                    if !hits.is_empty() {
                        removes.insert(id.clone(), hits);
                    }
                }
            }
        }
        Ok(Reconciliation::new(
            KvData::Tagged(fixes),
            KvData::Tagged(removes),
            Vec::new(),
        ))
    }

    fn apply(&mut self, fixables: &KvData, removables: &KvData) -> Result<bool> {
        if fixables.is_empty() && removables.is_empty() {
            return Ok(true);
        }
        warn!(
            fixables = %fixables,
            removables = %removables,
            "Configuration profiles cannot be changed in place"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use remedy_test_utils::ScriptedRunner;

    const LISTING: &str = "\
_computerlevel[1] attribute: name: Screensaver
_computerlevel[1] attribute: profileIdentifier: com.example.screensaver
_computerlevel[1] attribute: profileVerificationState: verified
_computerlevel[2] attribute: profileIdentifier: com.example.firewall
There are 2 configuration profiles installed
";

    fn store() -> ProfilesStore {
        let runner = ScriptedRunner::new().ok(&["profiles", "-P", "-v"], LISTING);
        ProfilesStore::load(Arc::new(runner)).unwrap()
    }

    #[test]
    fn listing_is_grouped_by_identifier() {
        let s = store();
        let ids: Vec<&str> = s.profiles().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["com.example.firewall", "com.example.screensaver"]);
        assert_eq!(
            s.profiles()["com.example.screensaver"]["profileVerificationState"].joined(),
            "verified"
        );
    }

    #[test]
    fn missing_profile_is_fixable_but_not_appliable() {
        let mut s = store();
        let desired = KvData::tag("com.example.passcode", Vec::<(String, String)>::new());
        let rec = s.reconcile(&desired, Intent::Present).unwrap();
        assert!(!rec.validation.is_compliant());
        assert!(!s.apply(&rec.fixables, &rec.removables).unwrap());
    }

    #[test]
    fn installed_profile_with_matching_attribute_is_compliant() {
        let mut s = store();
        let desired = KvData::tag(
            "com.example.screensaver",
            [("profileVerificationState", "verified")],
        );
        let rec = s.reconcile(&desired, Intent::Present).unwrap();
        assert!(rec.validation.is_compliant());
    }

    #[test]
    fn failing_tool_is_an_external_tool_error() {
        let runner = ScriptedRunner::new();
        let err = ProfilesStore::load(Arc::new(runner)).unwrap_err();
        assert!(matches!(err, Error::ExternalTool { code: 127, .. }));
    }
}
