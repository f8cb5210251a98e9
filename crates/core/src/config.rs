use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub rules: RulesConfig,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RULEGATE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RULEGATE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
            auth: AuthConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:  {}:{} (cors={})", self.server.host, self.server.port, self.server.cors_origin);
        tracing::info!(
            "  rules:   upload_dir={}, builtin_dir={}, extensions=[{}], max_bytes={}, replay={}",
            self.rules.upload_dir.display(),
            self.rules.builtin_dir.display(),
            self.rules.allowed_extensions.join(","),
            self.rules.max_artifact_bytes,
            self.rules.replay_uploads
        );
        tracing::info!("  engine:  state_cache_size={}", self.engine.state_cache_size);
        tracing::info!("  auth:    admin_user={}", self.auth.admin_user);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            server: ServerConfig::default(),
            rules: RulesConfig::default(),
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 5000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: "*".to_string(),
        }
    }
}

// ── Ruleset definitions ───────────────────────────────────────

pub const DEFAULT_MAX_ARTIFACT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Where uploaded definition artifacts are persisted. Created on startup.
    pub upload_dir: PathBuf,
    /// Directory of built-in ruleset definition files (YAML).
    pub builtin_dir: PathBuf,
    /// Lowercase file extensions accepted for uploads, without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_artifact_bytes: usize,
    /// Re-register artifacts already present in `upload_dir` at startup.
    pub replay_uploads: bool,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        let allowed_extensions = parse_extensions(&profiled_env_or(p, "RULES_ALLOWED_EXTENSIONS", "py"));
        Self {
            upload_dir: PathBuf::from(profiled_env_or(p, "RULES_UPLOAD_DIR", "rules")),
            builtin_dir: PathBuf::from(profiled_env_or(p, "RULES_BUILTIN_DIR", "rulesets")),
            allowed_extensions,
            max_artifact_bytes: profiled_env_usize(p, "RULES_MAX_ARTIFACT_BYTES", DEFAULT_MAX_ARTIFACT_BYTES),
            replay_uploads: profiled_env_bool(p, "RULES_REPLAY_UPLOADS", false),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("rules"),
            builtin_dir: PathBuf::from("rulesets"),
            allowed_extensions: vec!["py".to_string()],
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            replay_uploads: false,
        }
    }
}

/// Split a comma-separated extension list, normalizing case and leading dots.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on session states kept hot per host.
    pub state_cache_size: usize,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            state_cache_size: profiled_env_usize(p, "STATE_CACHE_SIZE", 1024).max(1),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { state_cache_size: 1024 }
    }
}

// ── Auth ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub admin_user: String,
    #[serde(skip_serializing)]
    pub admin_password: String,
}

impl AuthConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            admin_user: profiled_env_or(p, "AUTH_ADMIN_USER", "admin"),
            admin_password: profiled_env_or(p, "AUTH_ADMIN_PASSWORD", "admin"),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalized() {
        assert_eq!(parse_extensions("py"), vec!["py"]);
        assert_eq!(parse_extensions(" .PY, yml ,,"), vec!["py", "yml"]);
        assert!(parse_extensions("").is_empty());
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.rules.upload_dir, PathBuf::from("rules"));
        assert_eq!(config.rules.allowed_extensions, vec!["py"]);
        assert_eq!(config.engine.state_cache_size, 1024);
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn admin_password_is_not_serialized() {
        let json = serde_json::to_value(AuthConfig::default()).unwrap();
        assert!(json.get("admin_password").is_none());
        assert_eq!(json["admin_user"], "admin");
    }
}
