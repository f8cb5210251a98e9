//! Definition envelope for lightweight first-pass deserialization.

use serde::{Deserialize, Serialize};

use super::{DefinitionKind, RegistrationLimits, RulesetDefinition, SUPPORTED_API_VERSION};

/// Lightweight first-pass deserializer that reads only the header fields.
///
/// Used during two-pass loading: first extract `kind` to determine the
/// concrete shape, then deserialize the rest of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    /// Remaining fields captured as raw YAML for second-pass deserialization.
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleBody {
    #[serde(default)]
    rulesets: Vec<RulesetDefinition>,
}

impl DefinitionEnvelope {
    /// Parse the `kind` field into a typed [`DefinitionKind`].
    pub fn definition_kind(&self) -> std::result::Result<DefinitionKind, String> {
        self.kind.parse()
    }

    /// Second pass: deserialize the body into rulesets and check them
    /// against `limits`.
    pub fn parse_full(
        &self,
        limits: &RegistrationLimits,
    ) -> std::result::Result<Vec<RulesetDefinition>, String> {
        if self.api_version != SUPPORTED_API_VERSION {
            return Err(format!(
                "unsupported apiVersion '{}' (expected '{}')",
                self.api_version, SUPPORTED_API_VERSION
            ));
        }

        let rulesets = match self.definition_kind()? {
            DefinitionKind::Ruleset => {
                let ruleset: RulesetDefinition =
                    serde_yaml::from_value(self.rest.clone()).map_err(|e| e.to_string())?;
                vec![ruleset]
            }
            DefinitionKind::RulesetBundle => {
                let body: BundleBody =
                    serde_yaml::from_value(self.rest.clone()).map_err(|e| e.to_string())?;
                body.rulesets
            }
        };

        if rulesets.is_empty() {
            return Err("document defines no rulesets".to_string());
        }
        if rulesets.len() > limits.max_rulesets_per_artifact {
            return Err(format!(
                "document defines {} rulesets (limit {})",
                rulesets.len(),
                limits.max_rulesets_per_artifact
            ));
        }

        let mut names = std::collections::HashSet::new();
        for ruleset in &rulesets {
            ruleset.validate(limits)?;
            if !names.insert(ruleset.name.as_str()) {
                return Err(format!("ruleset '{}' is defined twice", ruleset.name));
            }
        }
        Ok(rulesets)
    }
}
