//! Command runners for tests.
//!
//! [`ScriptedRunner`] answers from a script and records every call.
//! [`FakeDefaults`] emulates the macOS `defaults` tool over an in-memory
//! store so read/write/delete sequences behave like the real thing.
//! [`FaultyRunner`] wraps another runner and fails chosen commands the way
//! the system runner does on timeout or interrupt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use remedy_host::{CommandOutput, CommandRunner, Error, Result};

/// Answers commands from a script of `(argv prefix, output)` pairs.
///
/// The first entry whose prefix matches the argv wins; unmatched commands
/// exit 127 like a shell would for an unknown program.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Vec<(Vec<String>, CommandOutput)>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix`.
    pub fn on(mut self, prefix: &[&str], output: CommandOutput) -> Self {
        self.script
            .push((prefix.iter().map(|s| s.to_string()).collect(), output));
        self
    }

    /// Answer commands starting with `prefix` with exit 0 and `stdout`.
    pub fn ok(self, prefix: &[&str], stdout: &str) -> Self {
        self.on(prefix, CommandOutput::new(0, stdout, ""))
    }

    /// Every argv executed so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        let hit = self
            .script
            .iter()
            .find(|(prefix, _)| argv.starts_with(prefix))
            .map(|(_, out)| out.clone());
        Ok(hit.unwrap_or_else(|| {
            CommandOutput::new(127, "", format!("{}: command not found", argv.join(" ")))
        }))
    }
}

/// In-memory emulation of `defaults read|read-type|write|delete`.
#[derive(Debug, Default)]
pub struct FakeDefaults {
    /// (domain, key) -> (type name as `read-type` prints it, `read` output)
    store: Mutex<HashMap<(String, String), (String, String)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value: `kind` as `read-type` names it (`boolean`, `integer`,
    /// `string`, `array`), `printed` exactly as `read` would print it.
    pub fn with(self, domain: &str, key: &str, kind: &str, printed: &str) -> Self {
        self.store.lock().unwrap().insert(
            (domain.to_string(), key.to_string()),
            (kind.to_string(), printed.to_string()),
        );
        self
    }

    /// What `defaults read` would print, if the pair exists.
    pub fn get(&self, domain: &str, key: &str) -> Option<String> {
        self.store
            .lock()
            .unwrap()
            .get(&(domain.to_string(), key.to_string()))
            .map(|(_, printed)| printed.clone())
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn missing(domain: &str, key: &str) -> CommandOutput {
        CommandOutput::new(
            1,
            "",
            format!("The domain/default pair of ({domain}, {key}) does not exist\n"),
        )
    }

    fn lookup(&self, domain: &str, key: &str) -> Option<(String, String)> {
        self.store
            .lock()
            .unwrap()
            .get(&(domain.to_string(), key.to_string()))
            .cloned()
    }
}

impl CommandRunner for FakeDefaults {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();

        let out = match args.as_slice() {
            ["defaults", "read", domain, key] => match self.lookup(domain, key) {
                Some((_, printed)) => CommandOutput::new(0, format!("{printed}\n"), ""),
                None => Self::missing(domain, key),
            },
            ["defaults", "read-type", domain, key] => match self.lookup(domain, key) {
                Some((kind, _)) => CommandOutput::new(0, format!("Type is {kind}\n"), ""),
                None => Self::missing(domain, key),
            },
            ["defaults", "write", domain, key, flag, values @ ..] => {
                let entry = match (*flag, values) {
                    ("-bool", [v]) => match v.to_ascii_lowercase().as_str() {
                        "true" | "yes" | "1" => ("boolean", "1".to_string()),
                        _ => ("boolean", "0".to_string()),
                    },
                    ("-int", [v]) => ("integer", v.to_string()),
                    ("-float", [v]) => ("float", v.to_string()),
                    ("-string", [v]) => ("string", v.to_string()),
                    ("-array", items) => {
                        let body: Vec<String> =
                            items.iter().map(|i| format!("    {i}")).collect();
                        ("array", format!("(\n{}\n)", body.join(",\n")))
                    }
                    _ => return Ok(CommandOutput::new(1, "", "Command line interface error\n")),
                };
                self.store.lock().unwrap().insert(
                    (domain.to_string(), key.to_string()),
                    (entry.0.to_string(), entry.1),
                );
                CommandOutput::new(0, "", "")
            }
            ["defaults", "delete", domain, key] => {
                let removed = self
                    .store
                    .lock()
                    .unwrap()
                    .remove(&(domain.to_string(), key.to_string()));
                match removed {
                    Some(_) => CommandOutput::new(0, "", ""),
                    None => Self::missing(domain, key),
                }
            }
            _ => CommandOutput::new(1, "", "Command line interface error\n"),
        };
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Timeout,
    Interrupt,
}

/// Delegates to an inner runner, except for commands matching a fault prefix.
pub struct FaultyRunner {
    inner: Arc<dyn CommandRunner>,
    faults: Vec<(Vec<String>, Fault)>,
}

impl FaultyRunner {
    pub fn new(inner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner,
            faults: Vec::new(),
        }
    }

    /// Commands starting with `prefix` time out.
    pub fn timeout_on(mut self, prefix: &[&str]) -> Self {
        self.faults
            .push((prefix.iter().map(|s| s.to_string()).collect(), Fault::Timeout));
        self
    }

    /// Commands starting with `prefix` are interrupted.
    pub fn interrupt_on(mut self, prefix: &[&str]) -> Self {
        self.faults
            .push((prefix.iter().map(|s| s.to_string()).collect(), Fault::Interrupt));
        self
    }
}

impl CommandRunner for FaultyRunner {
    fn execute(&self, argv: &[String]) -> Result<CommandOutput> {
        let fault = self
            .faults
            .iter()
            .find(|(prefix, _)| argv.starts_with(prefix))
            .map(|(_, fault)| *fault);
        match fault {
            Some(Fault::Timeout) => Err(Error::Timeout {
                command: argv.join(" "),
                after: Duration::from_secs(1),
            }),
            Some(Fault::Interrupt) => Err(Error::Interrupted),
            None => self.inner.execute(argv),
        }
    }
}
