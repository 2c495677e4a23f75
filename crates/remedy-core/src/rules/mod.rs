//! Rules: the contract, its lifecycle, and the built-in key-value rule

mod applicability;
mod handle;
mod keyvalue;
mod registry;
mod rule;
mod ruleset;

pub use applicability::{Applicability, compare_versions, version_matches};
pub use handle::{RuleHandle, RuleState};
pub use keyvalue::KeyValueRule;
pub use registry::{RuleFactory, RuleRegistry};
pub use rule::{Compliance, Finding, FixContext, ReportContext, Rule, RuleInfo};
pub use ruleset::{RuleSet, RuleSpec};
