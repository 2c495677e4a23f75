//! Operator interrupt flag
//!
//! SIGINT and SIGTERM set a shared flag instead of killing the process. The
//! command runner polls it while waiting on children and the driver polls it
//! between rules, so an interrupt surfaces as [`Error::Interrupted`] at the
//! next checkpoint and is never swallowed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// A flag that is only raised programmatically.
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag raised by SIGINT or SIGTERM.
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&flag.0)).map_err(|e| {
                Error::Spawn {
                    command: format!("signal handler {signal}"),
                    source: e,
                }
            })?;
        }
        Ok(flag)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint: fail with `Interrupted` once the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_fails_after_raise() {
        let flag = InterruptFlag::new();
        assert!(flag.check().is_ok());

        flag.clone().raise();
        assert!(flag.check().unwrap_err().is_interrupt());
    }
}
