//! Shared test utilities for the remedy workspace.
//!
//! This crate is a dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`runner`]: command runners that never touch the host
//! - [`host`]: [`TestHost`] sandbox with the standard state layout

pub mod host;
pub mod runner;

pub use host::TestHost;
pub use runner::{FakeDefaults, FaultyRunner, ScriptedRunner};
