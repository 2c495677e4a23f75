//! External command execution
//!
//! Rules and tool-backed stores only need a synchronous request/response
//! shape: argv in, exit code plus captured output back. [`SystemRunner`]
//! adds what the shell-out style lacks: a deadline after which the child is
//! killed, and an interrupt checkpoint while waiting.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{Error, InterruptFlag, Result};

/// Default deadline for one external command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the child was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit code, with -1 standing in for death by signal.
    pub fn code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }
}

/// Executes external commands.
pub trait CommandRunner {
    /// Run `argv` to completion.
    ///
    /// A non-zero exit is returned as output, not as an error. Errors are
    /// reserved for commands that could not be started, timed out, or were
    /// interrupted.
    fn execute(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Build an owned argv from string slices.
pub fn argv<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    parts.iter().map(|p| p.as_ref().to_string()).collect()
}

/// Runs commands on the local host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
    interrupt: InterruptFlag,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, InterruptFlag::new())
    }
}

impl SystemRunner {
    pub fn new(timeout: Duration, interrupt: InterruptFlag) -> Self {
        Self { timeout, interrupt }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn wait(&self, child: &mut Child, command: &str) -> Result<Option<i32>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.code()),
                Ok(None) => {}
                Err(e) => {
                    return Err(Error::Spawn {
                        command: command.to_string(),
                        source: e,
                    });
                }
            }

            if self.interrupt.is_set() {
                kill(child, command);
                return Err(Error::Interrupted);
            }
            if Instant::now() >= deadline {
                kill(child, command);
                return Err(Error::Timeout {
                    command: command.to_string(),
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput> {
        self.interrupt.check()?;

        let command = argv.join(" ");
        let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
        })?;

        debug!(command = %command, "exec");
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn {
                command: command.clone(),
                source: e,
            })?;

        // Drain both pipes while polling for exit
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child, &command)?;

        let output = CommandOutput {
            status,
            stdout: stdout.map(join).unwrap_or_default(),
            stderr: stderr.map(join).unwrap_or_default(),
        };
        if !output.success() {
            debug!(command = %command, code = output.code(), stderr = %output.stderr.trim(), "exec failed");
        }
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn kill(child: &mut Child, command: &str) {
    if let Err(e) = child.kill() {
        warn!(command = %command, error = %e, "Could not kill child");
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_code_for_signal_death() {
        let out = CommandOutput {
            status: None,
            ..Default::default()
        };
        assert_eq!(out.code(), -1);
        assert!(!out.success());
    }

    #[test]
    fn argv_builds_owned_strings() {
        assert_eq!(argv(&["defaults", "read"]), vec!["defaults", "read"]);
    }

    #[test]
    fn empty_argv_is_spawn_error() {
        let err = SystemRunner::default().execute(&[]).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
