//! Show, edit and save the rule configuration

use colored::Colorize;
use remedy_core::{ConfigView, RuleConfig};

use crate::cli::ConfigAction;
use crate::context::{Session, apply_all, record_all};
use crate::error::{CliError, Result};

pub fn run_config(session: &Session, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { simple } => {
            let config = effective(session)?;
            print!("{}", config.render(view(simple)));
            Ok(())
        }
        ConfigAction::Set { rule, key, value } => set(session, &rule, &key, &value),
        ConfigAction::Save { simple } => {
            let config = effective(session)?;
            let path = &session.settings.rule_config;
            config.save(path, view(simple))?;
            println!(
                "{} Saved rule configuration to {}",
                "OK".green().bold(),
                path.display().to_string().cyan()
            );
            Ok(())
        }
    }
}

fn view(simple: bool) -> ConfigView {
    if simple {
        ConfigView::Simple
    } else {
        ConfigView::Full
    }
}

/// Defaults of every rule overlaid with what the file already says.
fn effective(session: &Session) -> Result<RuleConfig> {
    let mut config = session.rule_config_or_new()?;
    let mut rules = session.rules(&[])?;
    apply_all(&config, &mut rules)?;
    record_all(&mut config, &rules);
    Ok(config)
}

fn set(session: &Session, rule: &str, key: &str, value: &str) -> Result<()> {
    let mut config = session.rule_config_or_new()?;
    let mut rules = session.rules(&[rule.to_string()])?;
    apply_all(&config, &mut rules)?;

    let item = rules
        .iter_mut()
        .flat_map(|handle| handle.items_mut().iter_mut())
        .find(|item| item.key() == key)
        .ok_or_else(|| CliError::user(format!("Rule '{rule}' has no item '{key}'")))?;
    item.set_from_text(value)?;
    let text = item.value().to_text();

    session.save_config(&mut config, &rules)?;
    println!(
        "{} {}.{} = {}",
        "OK".green().bold(),
        rule,
        key,
        text.cyan()
    );
    Ok(())
}
