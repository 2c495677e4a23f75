//! Change log events and their ids

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use remedy_host::FileMeta;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Rule-scoped event id, formatted `RRRR-SSSS`.
///
/// Combining the rule id with the per-fix sequence keeps ids from two rules
/// apart even though every sequence starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId {
    pub rule: u32,
    pub seq: u32,
}

impl EventId {
    pub fn new(rule: u32, seq: u32) -> Self {
        Self { rule, seq }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.rule, self.seq)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::ChangeLog {
            message: format!("malformed event id {s:?}"),
        };
        let (rule, seq) = s.split_once('-').ok_or_else(bad)?;
        Ok(Self {
            rule: rule.parse().map_err(|_| bad())?,
            seq: seq.parse().map_err(|_| bad())?,
        })
    }
}

impl TryFrom<String> for EventId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.to_string()
    }
}

/// Hands out strictly increasing ids for one rule's fix.
#[derive(Debug, Clone)]
pub struct EventIds {
    rule: u32,
    next: u32,
}

impl EventIds {
    pub fn new(rule: u32) -> Self {
        Self { rule, next: 0 }
    }

    /// Continue after the highest id already recorded.
    pub fn after(last: Option<EventId>, rule: u32) -> Self {
        Self {
            rule,
            next: last.map(|id| id.seq + 1).unwrap_or(0),
        }
    }

    /// The id `next_id` will hand out, without taking it.
    pub fn peek(&self) -> EventId {
        EventId::new(self.rule, self.next)
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId::new(self.rule, self.next);
        self.next += 1;
        id
    }
}

/// What a fix did, with enough payload to reverse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// A file that did not exist was created
    Creation { path: PathBuf },
    /// A configuration file was rewritten
    Conf {
        path: PathBuf,
        /// Copy of the previous content; `None` when the fix created the file
        backup: Option<PathBuf>,
        /// Mode and ownership before the fix
        meta: Option<FileMeta>,
        /// Checksum of the content the fix left behind
        checksum: Option<String>,
    },
    /// Mode, owner or group changed
    Permission { path: PathBuf, prior: FileMeta },
    /// A package was installed or removed
    PackageState { package: String, prior: String },
    /// External commands ran; `undo` lists the commands that reverse them
    Command {
        run: Vec<Vec<String>>,
        #[serde(default)]
        undo: Vec<Vec<String>>,
    },
}

impl EventKind {
    /// Short type name as stored in the log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Creation { .. } => "creation",
            Self::Conf { .. } => "conf",
            Self::Permission { .. } => "permission",
            Self::PackageState { .. } => "package-state",
            Self::Command { .. } => "command",
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(id: EventId, kind: EventKind) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn rule(&self) -> u32 {
        self.id.rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_zero_padded_and_parse_back() {
        let id = EventId::new(8, 3);
        assert_eq!(id.to_string(), "0008-0003");
        assert_eq!("0008-0003".parse::<EventId>().unwrap(), id);
        assert!("8.3".parse::<EventId>().is_err());
    }

    #[test]
    fn ids_from_two_rules_never_collide() {
        let mut a = EventIds::new(1);
        let mut b = EventIds::new(2);
        assert_ne!(a.next_id(), b.next_id());
    }

    #[test]
    fn sequence_is_strictly_increasing() {
        let mut ids = EventIds::after(Some(EventId::new(5, 4)), 5);
        let first = ids.next_id();
        assert_eq!(first, EventId::new(5, 5));
        assert!(ids.next_id() > first);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ids = EventIds::new(2);
        assert_eq!(ids.peek(), EventId::new(2, 0));
        assert_eq!(ids.next_id(), EventId::new(2, 0));
        assert_eq!(ids.peek(), EventId::new(2, 1));
    }
}
