//! List the registered rules

use colored::Colorize;
use serde::Serialize;

use crate::context::Session;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ListedRule<'a> {
    id: u32,
    name: &'a str,
    description: &'a str,
    mandatory: bool,
    root_required: bool,
}

pub fn run_list(session: &Session, json: bool) -> Result<()> {
    let rules = session.rules(&[])?;
    let listed: Vec<ListedRule<'_>> = rules
        .iter()
        .map(|handle| {
            let info = handle.info();
            ListedRule {
                id: info.id,
                name: &info.name,
                description: &info.description,
                mandatory: info.mandatory,
                root_required: info.root_required,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if listed.is_empty() {
        println!(
            "No rules registered. Add rules to {}",
            session.settings.rule_set.display().to_string().cyan()
        );
        return Ok(());
    }

    println!("{}", "Rules".bold());
    println!();
    for rule in &listed {
        let mut flags = Vec::new();
        if rule.mandatory {
            flags.push("mandatory");
        }
        if rule.root_required {
            flags.push("root");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", ")).dimmed().to_string()
        };
        println!("  {:>4}  {}{}", rule.id, rule.name.cyan(), flags);
        if !rule.description.is_empty() {
            println!("        {}", rule.description);
        }
    }
    println!();
    println!("{} rule(s)", listed.len());
    Ok(())
}
