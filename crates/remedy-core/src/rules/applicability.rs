//! Which hosts a rule applies to
//!
//! ```toml
//! [applicability]
//! type = "white"
//! family = ["linux"]
//! os = { "Mac OS X" = ["10.9", "+"], "Ubuntu" = ["20.04", "24.04", "r"] }
//! ```
//!
//! Version lists: plain versions match exactly (any of them), a trailing
//! `+` means that version or newer, `-` that version or older, `r` an
//! inclusive range (lower bound first) and `or` an explicit list.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicability {
    /// `white` (allow-list) or `black` (deny-list)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub family: Vec<String>,
    /// OS type → version operators
    #[serde(default)]
    pub os: BTreeMap<String, Vec<String>>,
}

impl Default for Applicability {
    fn default() -> Self {
        Self {
            kind: "white".to_string(),
            family: Vec::new(),
            os: BTreeMap::new(),
        }
    }
}

impl Applicability {
    pub fn white() -> Self {
        Self::default()
    }

    pub fn black() -> Self {
        Self {
            kind: "black".to_string(),
            ..Self::default()
        }
    }

    pub fn with_family(mut self, family: &str) -> Self {
        self.family.push(family.to_string());
        self
    }

    pub fn with_os(mut self, os_type: &str, versions: &[&str]) -> Self {
        self.os.insert(
            os_type.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Evaluate against `env`.
    ///
    /// A descriptor without criteria applies everywhere. An unknown `type`
    /// or malformed version list is an error, never a silent default.
    pub fn is_applicable(&self, env: &dyn Environment) -> Result<bool> {
        let white = match self.kind.as_str() {
            "white" => true,
            "black" => false,
            other => {
                return Err(Error::Applicability(format!(
                    "unknown type {other:?}, expected \"white\" or \"black\""
                )));
            }
        };
        if self.family.is_empty() && self.os.is_empty() {
            return Ok(true);
        }

        let family_hit = self.family.iter().any(|f| f == env.os_family());
        let os_hit = match self.os.get(env.os_type()) {
            Some(spec) => version_matches(spec, env.os_version())?,
            None => false,
        };
        let matched = family_hit || os_hit;
        Ok(if white { matched } else { !matched })
    }
}

/// Whether `version` satisfies the operator list `spec`.
pub fn version_matches(spec: &[String], version: &str) -> Result<bool> {
    let bad = |why: &str| Error::Applicability(format!("{spec:?}: {why}"));
    let Some((last, rest)) = spec.split_last() else {
        // No versions listed: every version of this OS
        return Ok(true);
    };

    match last.as_str() {
        "+" | "-" => {
            let [base] = rest else {
                return Err(bad("expects exactly one version before the operator"));
            };
            let ord = compare_versions(version, base);
            Ok(if last == "+" {
                ord != Ordering::Less
            } else {
                ord != Ordering::Greater
            })
        }
        "r" => {
            let [low, high] = rest else {
                return Err(bad("a range expects exactly two versions"));
            };
            if compare_versions(low, high) == Ordering::Greater {
                return Err(bad("range lower bound must come first"));
            }
            Ok(compare_versions(version, low) != Ordering::Less
                && compare_versions(version, high) != Ordering::Greater)
        }
        "or" => {
            if rest.is_empty() {
                return Err(bad("\"or\" needs at least one version"));
            }
            Ok(rest.iter().any(|v| compare_versions(version, v) == Ordering::Equal))
        }
        _ => Ok(spec.iter().any(|v| compare_versions(version, v) == Ordering::Equal)),
    }
}

/// Compare dotted versions component-wise; missing components count as 0.
///
/// Numeric components compare numerically, anything else lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.trim().split('.').collect();
    let right: Vec<&str> = b.trim().split('.').collect();
    for i in 0..left.len().max(right.len()) {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
