//! Typed, user-overridable settings bound to a rule
//!
//! Every value read from config text goes through [`ItemValue::parse`], so
//! the rest of the crate only ever sees values that match their datatype.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declared type of a configuration item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Bool,
    String,
    Int,
    List,
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Int => "int",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// A configuration item value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl ItemValue {
    pub fn datatype(&self) -> Datatype {
        match self {
            Self::Bool(_) => Datatype::Bool,
            Self::Int(_) => Datatype::Int,
            Self::Str(_) => Datatype::String,
            Self::List(_) => Datatype::List,
        }
    }

    /// Coerce config text into a value of `datatype`.
    ///
    /// Booleans accept true/false, yes/no, on/off and 1/0 in any case; lists
    /// split on whitespace.
    pub fn parse(key: &str, datatype: Datatype, text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |message: String| Error::InvalidValue {
            key: key.to_string(),
            message,
        };
        match datatype {
            Datatype::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Self::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Self::Bool(false)),
                _ => Err(invalid(format!("{text:?} is not a boolean"))),
            },
            Datatype::Int => text
                .parse()
                .map(Self::Int)
                .map_err(|_| invalid(format!("{text:?} is not an integer"))),
            Datatype::String => Ok(Self::Str(text.to_string())),
            Datatype::List => Ok(Self::List(
                text.split_whitespace().map(str::to_string).collect(),
            )),
        }
    }

    /// Config-text form; lists are joined with single spaces.
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(items) => items.join(" "),
        }
    }

    /// Truthiness used to decide whether a fix may run.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// A named setting owned by one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    key: String,
    datatype: Datatype,
    value: ItemValue,
    default: ItemValue,
    /// Help text written above the key in the persisted config
    pub instructions: String,
    /// Free-form operator note, persisted as `UC<key>`
    pub user_comment: String,
    /// Part of the reduced configuration view
    pub simple: bool,
}

impl ConfigurationItem {
    /// Create an item whose datatype is that of `default`.
    pub fn new(key: impl Into<String>, default: ItemValue, instructions: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            datatype: default.datatype(),
            value: default.clone(),
            default,
            instructions: instructions.into(),
            user_comment: String::new(),
            simple: false,
        }
    }

    pub fn simple(mut self) -> Self {
        self.simple = true;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn default_value(&self) -> &ItemValue {
        &self.default
    }

    /// Replace the current value, rejecting a datatype mismatch.
    pub fn set_value(&mut self, value: ItemValue) -> Result<()> {
        if value.datatype() != self.datatype {
            return Err(Error::InvalidValue {
                key: self.key.clone(),
                message: format!("expected {}, got {}", self.datatype, value.datatype()),
            });
        }
        if let ItemValue::List(items) = &value
            && let Some(bad) = items
                .iter()
                .find(|i| i.is_empty() || i.chars().any(char::is_whitespace))
        {
            return Err(Error::InvalidValue {
                key: self.key.clone(),
                message: format!("list element {bad:?} is empty or contains whitespace"),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Set the current value from config text.
    pub fn set_from_text(&mut self, text: &str) -> Result<()> {
        let value = ItemValue::parse(&self.key, self.datatype, text)?;
        self.set_value(value)
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }

    pub fn is_truthy(&self) -> bool {
        self.value.is_truthy()
    }
}
