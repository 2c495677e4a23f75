//! Everything a command needs: settings, host facts, runner and rules
//!
//! A [`Session`] is built once per invocation. The host environment is only
//! probed by commands that run rules, so `list` and `config` work on any host.

use std::path::Path;
use std::sync::Arc;

use remedy_core::{
    ConfigView, Error as CoreError, RuleConfig, RuleHandle, RuleRegistry, RuleSet, Settings,
    StaticEnvironment,
};
use remedy_host::{CommandRunner, InterruptFlag, SystemRunner, exec::argv};
use tracing::debug;

use crate::cli::HostArgs;
use crate::error::{CliError, Result};

pub struct Session {
    pub settings: Settings,
    pub interrupt: InterruptFlag,
    pub runner: Arc<dyn CommandRunner>,
    pub registry: RuleRegistry,
    host: HostArgs,
}

impl Session {
    /// Load settings and the rule set, and install the interrupt handler.
    ///
    /// An explicit settings path must exist; the default one may be absent.
    pub fn open(settings_path: Option<&Path>, host: &HostArgs) -> Result<Self> {
        let settings = match settings_path {
            Some(path) => Settings::load(path)?,
            None => Settings::load_or_default(Path::new(Settings::DEFAULT_PATH))?,
        };
        let interrupt = InterruptFlag::install()?;
        let runner: Arc<dyn CommandRunner> =
            Arc::new(SystemRunner::new(settings.timeout(), interrupt.clone()));
        let registry = RuleRegistry::from_rule_set(&RuleSet::load(&settings.rule_set)?)?;
        debug!(rules = registry.len(), rule_set = %settings.rule_set.display(), "Session ready");

        Ok(Self {
            settings,
            interrupt,
            runner,
            registry,
            host: host.clone(),
        })
    }

    /// Host facts from the command line, or probed from the running system.
    pub fn environment(&self) -> Result<StaticEnvironment> {
        let install_mode = self.settings.install_mode;
        let Some(family) = &self.host.os_family else {
            return Ok(StaticEnvironment::detect(&self.runner, install_mode)?);
        };
        let env = StaticEnvironment::new(
            family,
            self.host.os_type.as_deref().unwrap_or_default(),
            self.host.os_version.as_deref().unwrap_or_default(),
        )
        .with_install_mode(install_mode)
        .with_root(self.is_root()?);
        Ok(env)
    }

    fn is_root(&self) -> Result<bool> {
        let out = self.runner.execute(&argv(&["id", "-u"]))?;
        Ok(out.stdout.trim() == "0")
    }

    /// Instantiate the named rules, or all of them when `names` is empty.
    pub fn rules(&self, names: &[String]) -> Result<Vec<RuleHandle>> {
        if names.is_empty() {
            return Ok(self.registry.instantiate_all());
        }
        names
            .iter()
            .map(|name| {
                let id = self
                    .registry
                    .id_of(name)
                    .ok_or_else(|| CliError::user(format!("Unknown rule '{name}'")))?;
                Ok(self.registry.instantiate(id)?)
            })
            .collect()
    }

    /// The persisted rule configuration, which must exist.
    pub fn rule_config(&self) -> Result<RuleConfig> {
        let path = &self.settings.rule_config;
        match RuleConfig::load(path) {
            Err(CoreError::ConfigNotFound { .. }) => Err(CliError::user(format!(
                "No rule configuration at {}. Run `remedy config save` to create it.",
                path.display()
            ))),
            other => Ok(other?),
        }
    }

    /// The persisted rule configuration, or an empty one.
    pub fn rule_config_or_new(&self) -> Result<RuleConfig> {
        match RuleConfig::load(&self.settings.rule_config) {
            Err(CoreError::ConfigNotFound { .. }) => Ok(RuleConfig::new()),
            other => Ok(other?),
        }
    }

    /// Write back the items of `rules` over what `config` already holds.
    pub fn save_config(&self, config: &mut RuleConfig, rules: &[RuleHandle]) -> Result<()> {
        record_all(config, rules);
        config.save(&self.settings.rule_config, ConfigView::Full)?;
        Ok(())
    }
}

/// Apply `config` to every rule's items.
pub fn apply_all(config: &RuleConfig, rules: &mut [RuleHandle]) -> Result<()> {
    for handle in rules.iter_mut() {
        let name = handle.info().name.clone();
        config.apply(&name, handle.items_mut())?;
    }
    Ok(())
}

/// Capture every rule's items into `config`.
pub fn record_all(config: &mut RuleConfig, rules: &[RuleHandle]) {
    for handle in rules {
        config.record(&handle.info().name, handle.items());
    }
}
