//! Rule registry
//!
//! Maps rule ids to constructors. Handles are built fresh for every run so
//! no state leaks between runs.

use std::collections::BTreeMap;

use super::handle::RuleHandle;
use super::rule::Rule;
use super::ruleset::RuleSet;
use crate::{Error, Result};

/// Builds one rule instance.
pub type RuleFactory = Box<dyn Fn() -> Box<dyn Rule>>;

struct Entry {
    name: String,
    factory: RuleFactory,
}

/// Registry mapping rule ids to their constructors.
///
/// # Example
///
/// ```
/// use remedy_core::rules::{KeyValueRule, Rule, RuleInfo, RuleRegistry};
/// use remedy_kv::{Dialect, EditorSpec, KvData};
///
/// let mut registry = RuleRegistry::new();
/// registry
///     .register(7, "AslrEnabled", || -> Box<dyn Rule> {
///         let spec = EditorSpec::new(
///             Dialect::Conf,
///             "/etc/sysctl.conf",
///             KvData::flat([("kernel.randomize_va_space", "2")]),
///         );
///         Box::new(KeyValueRule::new(RuleInfo::new(7, "AslrEnabled"), spec))
///     })
///     .unwrap();
/// assert_eq!(registry.ids(), vec![7]);
/// ```
#[derive(Default)]
pub struct RuleRegistry {
    entries: BTreeMap<u32, Entry>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, e)| (id, &e.name)))
            .finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding every rule of `set`.
    pub fn from_rule_set(set: &RuleSet) -> Result<Self> {
        let mut registry = Self::new();
        registry.extend_from(set)?;
        Ok(registry)
    }

    /// Register every rule of `set`.
    pub fn extend_from(&mut self, set: &RuleSet) -> Result<()> {
        for spec in &set.rules {
            let spec = spec.clone();
            let name = spec.name.clone();
            self.register(spec.id, name, move || -> Box<dyn Rule> { Box::new(spec.build()) })?;
        }
        Ok(())
    }

    /// Register a constructor.
    ///
    /// Ids and names must both be unique.
    pub fn register<F>(&mut self, id: u32, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Rule> + 'static,
    {
        let name = name.into();
        if let Some(existing) = self.entries.get(&id) {
            return Err(Error::Registry(format!(
                "id {id} is used by both {} and {name}",
                existing.name
            )));
        }
        if self.entries.values().any(|e| e.name == name) {
            return Err(Error::Registry(format!("name {name} is registered twice")));
        }
        self.entries.insert(
            id,
            Entry {
                name,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    /// Look up an id by rule name.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Construct the rule registered under `id`.
    pub fn instantiate(&self, id: u32) -> Result<RuleHandle> {
        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| Error::Registry(format!("no rule with id {id}")))?;
        Ok(RuleHandle::new((entry.factory)()))
    }

    /// Construct every registered rule in id order.
    pub fn instantiate_all(&self) -> Vec<RuleHandle> {
        self.entries
            .values()
            .map(|e| RuleHandle::new((e.factory)()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{KeyValueRule, RuleInfo};
    use remedy_kv::{Dialect, EditorSpec, KvData};

    fn rule(id: u32, name: &'static str) -> impl Fn() -> Box<dyn Rule> {
        move || -> Box<dyn Rule> {
            let spec = EditorSpec::new(Dialect::Conf, "/etc/x.conf", KvData::flat([("a", "b")]));
            Box::new(KeyValueRule::new(RuleInfo::new(id, name), spec))
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(1, "First", rule(1, "First")).unwrap();
        let err = registry.register(1, "Second", rule(1, "Second")).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(1, "Same", rule(1, "Same")).unwrap();
        assert!(registry.register(2, "Same", rule(2, "Same")).is_err());
    }

    #[test]
    fn instantiates_in_id_order() {
        let mut registry = RuleRegistry::new();
        registry.register(20, "Later", rule(20, "Later")).unwrap();
        registry.register(3, "Earlier", rule(3, "Earlier")).unwrap();

        let names: Vec<String> = registry
            .instantiate_all()
            .iter()
            .map(|h| h.info().name.clone())
            .collect();
        assert_eq!(names, ["Earlier", "Later"]);
        assert_eq!(registry.id_of("Later"), Some(20));
        assert!(registry.instantiate(99).is_err());
    }
}
