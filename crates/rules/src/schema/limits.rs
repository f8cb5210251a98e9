//! Bounds applied when interpreting a definition artifact.

/// Only this `apiVersion` is accepted.
pub const SUPPORTED_API_VERSION: &str = "v1";

/// Ruleset names that collide with fixed routes.
pub const RESERVED_RULESET_NAMES: &[&str] = &["rulesets"];

const MAX_NAME_LEN: usize = 128;

/// What a single artifact is allowed to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationLimits {
    pub max_rulesets_per_artifact: usize,
    pub max_rules_per_ruleset: usize,
}

impl Default for RegistrationLimits {
    fn default() -> Self {
        Self {
            max_rulesets_per_artifact: 32,
            max_rules_per_ruleset: 256,
        }
    }
}

/// Check a ruleset or rule name: 1..=128 chars of `[A-Za-z0-9_.-]`.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name '{}' exceeds {} characters", name, MAX_NAME_LEN));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(format!("name '{}' contains invalid character {:?}", name, bad));
    }
    Ok(())
}
