//! Definition kind enum for two-pass deserialization dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionKind {
    /// A single ruleset at the document root.
    Ruleset,
    /// Several rulesets under a `rulesets:` list.
    RulesetBundle,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Ruleset => write!(f, "Ruleset"),
            DefinitionKind::RulesetBundle => write!(f, "RulesetBundle"),
        }
    }
}

impl FromStr for DefinitionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Ruleset" => Ok(DefinitionKind::Ruleset),
            "RulesetBundle" => Ok(DefinitionKind::RulesetBundle),
            other => Err(format!("unknown definition kind: '{}'", other)),
        }
    }
}
