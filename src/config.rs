//! Configuration loader and validator for the student bot store.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub admin: AdminConfig,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// External values the administrator record is seeded from. Passed
/// explicitly into `ensure_admin` at call time, so each environment or
/// test can supply its own values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminConfig {
    pub telegram_chat_id: i64,
    pub email: String,
    pub phone_number: i64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.admin.telegram_chat_id <= 0 {
        return Err(ConfigError::Invalid("admin.telegram_chat_id must be > 0"));
    }
    if cfg.admin.email.trim().is_empty() {
        return Err(ConfigError::Invalid("admin.email must be non-empty"));
    }
    if cfg.admin.phone_number <= 0 {
        return Err(ConfigError::Invalid("admin.phone_number must be > 0"));
    }

    Ok(())
}

/// Example YAML document used in docs and tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

admin:
  telegram_chat_id: 123456789
  email: "admin@example.com"
  phone_number: 989120000000
"#
}
