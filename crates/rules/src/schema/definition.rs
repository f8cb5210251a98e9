//! Ruleset, rule, and action types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::message_sid;
use crate::value::EngineValue;

use super::{validate_name, RegistrationLimits, RESERVED_RULESET_NAMES};

/// A named, independently addressable collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RulesetDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Seed applied to the default session every time a host starts.
    #[serde(default)]
    pub startup: Option<StartupSpec>,
}

/// Which kind of message a rule reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Event,
    Fact,
    #[default]
    Any,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Event => "event",
            Trigger::Fact => "fact",
            Trigger::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub on: Trigger,
    /// Field equality pattern; an empty pattern matches every message.
    #[serde(default)]
    pub when: Map<String, Value>,
    #[serde(default)]
    pub then: ActionSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Fields merged into the session state when the rule fires.
    #[serde(default)]
    pub set: Map<String, Value>,
    /// The action completes asynchronously and is exposed as a promise.
    #[serde(default)]
    pub deferred: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StartupSpec {
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub facts: Vec<Value>,
    #[serde(default)]
    pub events: Vec<Value>,
}

impl RuleSpec {
    /// Whether this rule reacts to `kind` messages.
    pub fn listens_to(&self, kind: Trigger) -> bool {
        self.on == Trigger::Any || self.on == kind
    }

    /// Every `when` field must be present in `message` with an equal value.
    pub fn matches(&self, message: &Value) -> bool {
        let Some(fields) = message.as_object() else {
            return false;
        };
        self.when
            .iter()
            .all(|(key, expected)| fields.get(key) == Some(expected))
    }
}

impl RulesetDefinition {
    /// Check the ruleset against registration bounds.
    pub fn validate(&self, limits: &RegistrationLimits) -> Result<(), String> {
        validate_name(&self.name).map_err(|e| format!("ruleset {}", e))?;
        if RESERVED_RULESET_NAMES.contains(&self.name.as_str()) {
            return Err(format!("ruleset name '{}' is reserved", self.name));
        }
        if self.rules.len() > limits.max_rules_per_ruleset {
            return Err(format!(
                "ruleset '{}' has {} rules (limit {})",
                self.name,
                self.rules.len(),
                limits.max_rules_per_ruleset
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            validate_name(&rule.name)
                .map_err(|e| format!("ruleset '{}': rule {}", self.name, e))?;
            if !seen.insert(rule.name.as_str()) {
                return Err(format!(
                    "ruleset '{}': duplicate rule '{}'",
                    self.name, rule.name
                ));
            }
        }

        if let Some(startup) = &self.startup {
            for message in startup.facts.iter().chain(startup.events.iter()) {
                message_sid(message).map_err(|e| {
                    format!("ruleset '{}': startup message {}: {}", self.name, message, e)
                })?;
            }
            message_sid(&Value::Object(startup.state.clone()))
                .map_err(|e| format!("ruleset '{}': startup state: {}", self.name, e))?;
        }
        Ok(())
    }

    /// Engine view of the definition. Rule actions are callables (or promises
    /// when deferred) and encode as `"function"`.
    pub fn get_definition(&self) -> EngineValue {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let action = if rule.then.deferred {
                    EngineValue::promise(rule.name.clone())
                } else {
                    EngineValue::callable(rule.name.clone())
                };
                EngineValue::object([
                    ("name", EngineValue::Json(Value::String(rule.name.clone()))),
                    ("on", EngineValue::Json(Value::String(rule.on.as_str().to_string()))),
                    ("when", EngineValue::Json(Value::Object(rule.when.clone()))),
                    ("then", action),
                ])
            })
            .collect();

        let mut entries = vec![
            ("name", EngineValue::Json(Value::String(self.name.clone()))),
            ("rules", EngineValue::Array(rules)),
        ];
        if let Some(description) = &self.description {
            entries.push(("description", EngineValue::Json(Value::String(description.clone()))));
        }
        EngineValue::object(entries)
    }
}
