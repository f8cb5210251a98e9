//! Application configuration loading.

/// Load configuration from `.env` and environment variables.
pub fn load_config() -> rulegate_core::Config {
    rulegate_core::config::load_dotenv();
    rulegate_core::Config::from_env()
}
