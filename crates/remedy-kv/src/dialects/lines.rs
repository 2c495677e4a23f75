//! Line model shared by the text dialects
//!
//! Untouched lines keep their original text so a commit only rewrites what
//! reconciliation actually changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::{FlatData, Intent, KvValue, Separator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Line {
    /// Blank line, comment, or anything else carried through unchanged
    Verbatim(String),
    Entry {
        key: String,
        value: String,
        /// Original text while the entry is unmodified
        raw: Option<String>,
    },
}

impl Line {
    pub(crate) fn parsed(key: &str, value: &str, raw: &str) -> Self {
        Self::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: Some(raw.to_string()),
        }
    }

    pub(crate) fn new_entry(key: &str, value: &str) -> Self {
        Self::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        }
    }

    pub(crate) fn key(&self) -> Option<&str> {
        match self {
            Self::Entry { key, .. } => Some(key),
            Self::Verbatim(_) => None,
        }
    }

    pub(crate) fn render(&self, sep: Separator) -> String {
        match self {
            Self::Verbatim(text) => text.clone(),
            Self::Entry { raw: Some(raw), .. } => raw.clone(),
            Self::Entry { key, value, raw: None } => sep.join(key, value),
        }
    }
}

/// Comment or blank, for the text dialects.
pub(crate) fn is_ignorable(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Values of every occurrence of `key`, in file order.
pub(crate) fn values<'a>(lines: &'a [Line], key: &str) -> Vec<&'a str> {
    lines
        .iter()
        .filter_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
        .collect()
}

/// Keys occurring more than once, with their counts.
pub(crate) fn duplicate_keys(lines: &[Line]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in lines.iter().filter_map(Line::key) {
        *counts.entry(key.to_string()).or_default() += 1;
    }
    counts.retain(|_, n| *n > 1);
    counts
}

/// Per-key outcome of comparing occurrences with a desired value.
#[derive(Debug, Default)]
pub(crate) struct KeyCheck {
    pub fix: Option<KvValue>,
    pub remove: Option<KvValue>,
    pub duplicated: bool,
}

/// Compare the occurrences of one key with its desired value.
///
/// Scalars must occur exactly once with the exact value. Lists use
/// set-membership over the whitespace-separated elements of every
/// occurrence, so duplicated list keys are legitimate.
pub(crate) fn check_key(found: &[&str], desired: &KvValue, intent: Intent) -> KeyCheck {
    let mut check = KeyCheck::default();
    match (intent, desired) {
        (Intent::Present, KvValue::Scalar(want)) => {
            check.duplicated = found.len() > 1;
            if found.len() != 1 || found[0] != want {
                check.fix = Some(desired.clone());
            }
        }
        (Intent::Present, KvValue::List(want)) => {
            let have = elements_of(found);
            let missing: Vec<String> = dedup(want)
                .into_iter()
                .filter(|w| !have.contains(w.as_str()))
                .collect();
            if !missing.is_empty() {
                check.fix = Some(KvValue::List(missing));
            }
        }
        (Intent::NotPresent, KvValue::Scalar(banned)) => {
            if found.iter().any(|v| v == banned) {
                check.remove = Some(desired.clone());
            }
        }
        (Intent::NotPresent, KvValue::List(banned)) => {
            let have = elements_of(found);
            let present: Vec<String> = dedup(banned)
                .into_iter()
                .filter(|b| have.contains(b.as_str()))
                .collect();
            if !present.is_empty() {
                check.remove = Some(KvValue::List(present));
            }
        }
    }
    check
}

/// Compare a flat section with desired data.
///
/// Returns (fixables, removables, duplicated desired keys).
pub(crate) fn check_flat(
    lines: &[Line],
    desired: &FlatData,
    intent: Intent,
) -> (FlatData, FlatData, Vec<String>) {
    let mut fixes = FlatData::new();
    let mut removes = FlatData::new();
    let mut duplicated = Vec::new();

    for (key, want) in desired {
        let check = check_key(&values(lines, key), want, intent);
        if check.duplicated {
            duplicated.push(key.clone());
        }
        if let Some(fix) = check.fix {
            fixes.insert(key.clone(), fix);
        }
        if let Some(remove) = check.remove {
            removes.insert(key.clone(), remove);
        }
    }
    (fixes, removes, duplicated)
}

/// Where a new entry goes: after the last entry, or at `fallback`.
pub(crate) fn after_last_entry(lines: &[Line], fallback: usize) -> usize {
    lines
        .iter()
        .rposition(|l| l.key().is_some())
        .map(|i| i + 1)
        .unwrap_or(fallback)
}

/// Make `key` occur exactly once with `value`.
///
/// `insert_at` is used when the key is absent.
pub(crate) fn set_scalar(lines: &mut Vec<Line>, key: &str, value: &str, insert_at: usize) {
    let mut seen = false;
    lines.retain_mut(|line| match line {
        Line::Entry { key: k, value: v, raw } if k == key => {
            if seen {
                return false;
            }
            seen = true;
            if v != value {
                *v = value.to_string();
                *raw = None;
            }
            true
        }
        _ => true,
    });
    if !seen {
        let at = insert_at.min(lines.len());
        lines.insert(at, Line::new_entry(key, value));
    }
}

/// Add list elements to the first occurrence of `key`, or insert it.
pub(crate) fn add_elements(lines: &mut Vec<Line>, key: &str, elements: &[String], insert_at: usize) {
    let first = lines.iter_mut().find_map(|line| match line {
        Line::Entry { key: k, value, raw } if k == key => Some((value, raw)),
        _ => None,
    });
    match first {
        Some((value, raw)) => {
            let mut current: Vec<String> = value.split_whitespace().map(str::to_string).collect();
            for element in elements {
                if !current.contains(element) {
                    current.push(element.clone());
                }
            }
            *value = current.join(" ");
            *raw = None;
        }
        None => {
            let at = insert_at.min(lines.len());
            lines.insert(at, Line::new_entry(key, &elements.join(" ")));
        }
    }
}

/// Strip `banned` from every occurrence of `key`.
///
/// Scalars drop whole lines whose value matches; lists drop matching
/// elements and then any line left empty.
pub(crate) fn remove_value(lines: &mut Vec<Line>, key: &str, banned: &KvValue) {
    match banned {
        KvValue::Scalar(value) => {
            lines.retain(|line| !matches!(line, Line::Entry { key: k, value: v, .. } if k == key && v == value));
        }
        KvValue::List(items) => {
            lines.retain_mut(|line| match line {
                Line::Entry { key: k, value, raw } if k == key => {
                    let kept: Vec<&str> = value
                        .split_whitespace()
                        .filter(|e| !items.iter().any(|i| i == e))
                        .collect();
                    if kept.is_empty() {
                        return false;
                    }
                    let joined = kept.join(" ");
                    if joined != *value {
                        *value = joined;
                        *raw = None;
                    }
                    true
                }
                _ => true,
            });
        }
    }
}

/// Apply flat working sets to a section.
pub(crate) fn apply_flat(
    lines: &mut Vec<Line>,
    fixes: &FlatData,
    removes: &FlatData,
    insert_at: impl Fn(&[Line]) -> usize,
) {
    for (key, value) in fixes {
        let at = insert_at(lines);
        match value {
            KvValue::Scalar(v) => set_scalar(lines, key, v, at),
            KvValue::List(items) => add_elements(lines, key, items, at),
        }
    }
    for (key, value) in removes {
        remove_value(lines, key, value);
    }
}

fn elements_of<'a>(found: &[&'a str]) -> BTreeSet<&'a str> {
    found.iter().flat_map(|v| v.split_whitespace()).collect()
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}
