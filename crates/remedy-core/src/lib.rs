//! Rule execution and state-change framework for remedy
//!
//! A [`rules::Rule`] inspects one aspect of the host, reports whether it is
//! compliant and, when enabled, fixes it. Every mutation a fix makes is
//! recorded in the [`ChangeLog`] with enough payload to reverse it, so
//! `undo` restores the host byte for byte.
//!
//! The [`Driver`] walks a set of rule handles sequentially and produces a
//! [`RunReport`]; the [`RuleConfig`] file lets operators tune each rule's
//! [`ConfigurationItem`]s between runs.

pub mod changelog;
pub mod driver;
pub mod environment;
pub mod error;
pub mod item;
pub mod ruleconfig;
pub mod rules;
pub mod settings;

pub use changelog::{BackupStore, ChangeLog, Event, EventId, EventIds, EventKind, NoReverse, ReverseAction};
pub use driver::{Driver, RuleOutcome, RunMode, RunReport, Status, Tally};
pub use environment::{Environment, StaticEnvironment};
pub use error::{Error, Result};
pub use item::{ConfigurationItem, Datatype, ItemValue};
pub use ruleconfig::{ConfigView, RuleConfig};
pub use rules::{Compliance, RuleHandle, RuleRegistry, RuleSet};
pub use settings::Settings;
