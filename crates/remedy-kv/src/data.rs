//! Desired-state data shared by every dialect

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A desired or observed value.
///
/// Lists compare as unordered sets; their serialized form joins elements
/// with single spaces, so elements must not contain whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KvValue {
    Scalar(String),
    List(Vec<String>),
}

impl KvValue {
    /// Elements as a set; a scalar is a one-element set.
    pub fn elements(&self) -> BTreeSet<&str> {
        match self {
            Self::Scalar(s) => std::iter::once(s.as_str()).collect(),
            Self::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Serialized text as it appears on the right-hand side of a line.
    pub fn joined(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::List(items) => items.join(" "),
        }
    }

    pub(crate) fn check(&self, what: &str) -> Result<()> {
        match self {
            Self::Scalar(s) if s.contains('\n') => Err(Error::Validation(format!(
                "value for {what} contains a newline"
            ))),
            Self::List(items) => {
                for item in items {
                    if item.is_empty() || item.chars().any(char::is_whitespace) {
                        return Err(Error::Validation(format!(
                            "list element {item:?} for {what} is empty or contains whitespace"
                        )));
                    }
                }
                Ok(())
            }
            Self::Scalar(_) => Ok(()),
        }
    }
}

impl fmt::Display for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl From<&str> for KvValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for KvValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for KvValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for KvValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_string).collect())
    }
}

/// key → value
pub type FlatData = BTreeMap<String, KvValue>;

/// tag → (key → value)
pub type TaggedData = BTreeMap<String, FlatData>;

/// Desired data, and the shape of the fixable/removable working sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KvData {
    Flat(FlatData),
    Tagged(TaggedData),
}

impl KvData {
    pub fn empty_flat() -> Self {
        Self::Flat(FlatData::new())
    }

    pub fn empty_tagged() -> Self {
        Self::Tagged(TaggedData::new())
    }

    /// Empty working set of the same shape.
    pub fn emptied(&self) -> Self {
        match self {
            Self::Flat(_) => Self::empty_flat(),
            Self::Tagged(_) => Self::empty_tagged(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Flat(map) => map.is_empty(),
            Self::Tagged(map) => map.is_empty(),
        }
    }

    /// Number of top-level keys (tags for tagged data).
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(map) => map.len(),
            Self::Tagged(map) => map.len(),
        }
    }

    /// Top-level keys (tags for tagged data), sorted.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Flat(map) => map.keys().map(String::as_str).collect(),
            Self::Tagged(map) => map.keys().map(String::as_str).collect(),
        }
    }

    pub fn as_flat(&self) -> Option<&FlatData> {
        match self {
            Self::Flat(map) => Some(map),
            Self::Tagged(_) => None,
        }
    }

    pub fn as_tagged(&self) -> Option<&TaggedData> {
        match self {
            Self::Tagged(map) => Some(map),
            Self::Flat(_) => None,
        }
    }

    /// Build flat data from `(key, value)` pairs.
    pub fn flat<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<KvValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Flat(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build tagged data for a single tag.
    pub fn tag<T, K, V, I>(tag: T, pairs: I) -> Self
    where
        T: Into<String>,
        K: Into<String>,
        V: Into<KvValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let inner = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::Tagged(std::iter::once((tag.into(), inner)).collect())
    }
}

impl fmt::Display for KvData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{}", parts.join(", "))
            }
            Self::Tagged(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(tag, inner)| {
                        let pairs: Vec<String> =
                            inner.iter().map(|(k, v)| format!("{k}={v}")).collect();
                        format!("[{tag}] {}", pairs.join(", "))
                    })
                    .collect();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

/// Whether the desired pairs must be present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Present,
    NotPresent,
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "notpresent" => Ok(Self::NotPresent),
            other => Err(Error::Validation(format!("unknown intent {other:?}"))),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::NotPresent => write!(f, "notpresent"),
        }
    }
}

/// How a key is separated from its value on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Separator {
    /// `key value`
    #[default]
    #[serde(rename = "space")]
    Space,
    /// `key = value`
    #[serde(rename = "openeq")]
    OpenEquals,
    /// `key=value`
    #[serde(rename = "closedeq")]
    ClosedEquals,
}

impl Separator {
    /// Split one non-comment line into key and value.
    ///
    /// `None` means the line does not follow this separator's grammar.
    pub fn split<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let line = line.trim();
        let (key, value) = match self {
            Self::Space => match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line, ""),
            },
            Self::OpenEquals | Self::ClosedEquals => {
                let (k, v) = line.split_once('=')?;
                (k.trim(), v.trim())
            }
        };
        if key.is_empty() { None } else { Some((key, value)) }
    }

    /// Render a key/value pair.
    pub fn join(&self, key: &str, value: &str) -> String {
        match self {
            Self::Space if value.is_empty() => key.to_string(),
            Self::Space => format!("{key} {value}"),
            Self::OpenEquals => format!("{key} = {value}"),
            Self::ClosedEquals => format!("{key}={value}"),
        }
    }

    /// Whether `key` can be written with this separator.
    pub(crate) fn accepts_key(&self, key: &str) -> bool {
        !key.is_empty()
            && !key.chars().any(char::is_whitespace)
            && !key.starts_with('#')
            && !key.starts_with('[')
            && (matches!(self, Self::Space) || !key.contains('='))
    }
}

impl FromStr for Separator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "space" => Ok(Self::Space),
            "openeq" => Ok(Self::OpenEquals),
            "closedeq" => Ok(Self::ClosedEquals),
            other => Err(Error::Validation(format!("unknown separator {other:?}"))),
        }
    }
}

/// Outcome of validating a store against desired data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Validation {
    Compliant,
    NonCompliant,
    /// The store could not be interpreted; the reason names the problem.
    Invalid(String),
}

impl Validation {
    pub fn is_compliant(&self) -> bool {
        matches!(self, Self::Compliant)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Separator::Space, "PermitRootLogin no", Some(("PermitRootLogin", "no")))]
    #[case(Separator::Space, "  Banner   /etc/issue  ", Some(("Banner", "/etc/issue")))]
    #[case(Separator::Space, "Protocol", Some(("Protocol", "")))]
    #[case(Separator::OpenEquals, "kernel.randomize_va_space = 2", Some(("kernel.randomize_va_space", "2")))]
    #[case(Separator::ClosedEquals, "umask=027", Some(("umask", "027")))]
    #[case(Separator::OpenEquals, "no separator here", None)]
    #[case(Separator::ClosedEquals, "= value", None)]
    fn separator_split(
        #[case] sep: Separator,
        #[case] line: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        assert_eq!(sep.split(line), expected);
    }

    #[test]
    fn separator_join_styles() {
        assert_eq!(Separator::Space.join("a", "b"), "a b");
        assert_eq!(Separator::OpenEquals.join("a", "b"), "a = b");
        assert_eq!(Separator::ClosedEquals.join("a", "b"), "a=b");
        assert_eq!(Separator::Space.join("Protocol", ""), "Protocol");
    }

    #[test]
    fn list_elements_are_a_set() {
        let value = KvValue::from(vec!["b", "a", "b"]);
        assert_eq!(value.elements().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn list_with_whitespace_element_is_rejected() {
        let value = KvValue::from(vec!["ok", "not ok"]);
        assert!(matches!(value.check("AllowUsers"), Err(Error::Validation(_))));
    }

    #[test]
    fn intent_parses_and_rejects_unknown() {
        assert_eq!("present".parse::<Intent>().unwrap(), Intent::Present);
        assert_eq!("notpresent".parse::<Intent>().unwrap(), Intent::NotPresent);
        assert!("absent".parse::<Intent>().is_err());
    }

    #[test]
    fn kv_data_deserializes_both_shapes() {
        let flat: KvData = toml::from_str(r#"foo = "1""#).unwrap();
        assert_eq!(flat, KvData::flat([("foo", "1")]));

        let tagged: KvData = toml::from_str("[stanzaA]\nk = \"v\"\n").unwrap();
        assert_eq!(tagged, KvData::tag("stanzaA", [("k", "v")]));
    }
}
