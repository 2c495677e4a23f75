//! Key-value configuration stores and editor for remedy
//!
//! Rules describe what a configuration should contain as a [`KvData`] map
//! plus an [`Intent`]. The [`KeyValueEditor`] loads the matching dialect
//! store, works out what must be added or stripped, reconciles in memory and
//! commits through a temp file and an atomic rename.
//!
//! Dialects:
//!
//! - `conf`: flat `key value` / `key = value` / `key=value` files
//! - `tagconf`: `[tag]` blocks of key/value pairs
//! - `defaults`: preference domains behind the `defaults` tool
//! - `profiles`: read-only inventory of installed configuration profiles

pub mod data;
pub mod diff;
pub mod dialects;
pub mod editor;
pub mod error;
pub mod store;

pub use data::{FlatData, Intent, KvData, KvValue, Separator, TaggedData, Validation};
pub use dialects::{ConfStore, DefaultsStore, ProfilesStore, TagConfStore};
pub use editor::{Dialect, EditorSpec, KeyValueEditor};
pub use error::{Error, Result};
pub use store::{ConfigStore, Reconciliation};
