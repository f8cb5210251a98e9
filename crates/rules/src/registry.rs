//! Process-wide definition registry.
//!
//! Holds every ruleset known to the gateway: built-ins loaded at startup and
//! upload artifacts keyed by their stored filename. Deleting a ruleset
//! tombstones its name; registering any artifact that defines the name again
//! clears the tombstone.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use crate::host::StartHook;
use crate::schema::RulesetDefinition;

#[derive(Clone, Default)]
pub struct DefinitionRegistry {
    builtins: IndexMap<String, RulesetDefinition>,
    /// Upload artifacts in registration order; later artifacts win on name clashes.
    uploads: IndexMap<String, Vec<RulesetDefinition>>,
    removed: HashSet<String>,
    hooks: Vec<StartHook>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_builtin(&mut self, definition: RulesetDefinition) {
        self.removed.remove(&definition.name);
        self.builtins.insert(definition.name.clone(), definition);
    }

    pub fn add_hook(&mut self, hook: StartHook) {
        self.hooks.push(hook);
    }

    pub fn hooks(&self) -> &[StartHook] {
        &self.hooks
    }

    /// Record (or replace) the rulesets an artifact defines.
    ///
    /// Re-registering a filename moves it to the end of the order, so its
    /// definitions take precedence over older artifacts.
    pub fn register_artifact(&mut self, filename: &str, definitions: Vec<RulesetDefinition>) {
        for definition in &definitions {
            self.removed.remove(&definition.name);
        }
        self.uploads.shift_remove(filename);
        self.uploads.insert(filename.to_string(), definitions);
    }

    /// Tombstone `name`. Returns false if it was not registered.
    pub fn remove(&mut self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        self.removed.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        if self.removed.contains(name) {
            return false;
        }
        self.builtins.contains_key(name)
            || self
                .uploads
                .values()
                .any(|defs| defs.iter().any(|d| d.name == name))
    }

    /// Current name -> definition mapping, tombstones applied.
    pub fn resolve(&self) -> BTreeMap<String, RulesetDefinition> {
        let mut resolved: BTreeMap<String, RulesetDefinition> = self
            .builtins
            .iter()
            .map(|(name, def)| (name.clone(), def.clone()))
            .collect();
        for definitions in self.uploads.values() {
            for def in definitions {
                resolved.insert(def.name.clone(), def.clone());
            }
        }
        resolved.retain(|name, _| !self.removed.contains(name));
        resolved
    }

}
