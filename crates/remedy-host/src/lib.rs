//! Host I/O for remedy
//!
//! Everything that touches the live system below the rule layer goes through
//! this crate: crash-safe file replacement that keeps permission bits and
//! ownership, content checksums, and external command execution with a
//! deadline and an interrupt flag.

pub mod checksum;
pub mod error;
pub mod exec;
pub mod interrupt;
pub mod io;
pub mod meta;

pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use interrupt::InterruptFlag;
pub use meta::FileMeta;
