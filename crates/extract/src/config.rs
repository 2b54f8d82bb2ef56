use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings for talking to the recognition service.
///
/// Holds no credential. The API key is read from the environment variable named
/// by `api_key_env` on every extraction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Total tries per image. `1` means a single attempt, no retry.
    pub max_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: 60,
            max_attempts: 1,
        }
    }
}

impl ExtractionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|k| std::env::var(k).ok())
    }

    /// Parse an `[extraction]`-shaped TOML table.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `LEDGERSCAN_*` overrides from `lookup` on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LEDGERSCAN_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("LEDGERSCAN_API_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("LEDGERSCAN_API_KEY_ENV") {
            self.api_key_env = v;
        }
        if let Some(v) = lookup("LEDGERSCAN_TIMEOUT_SECS") {
            self.timeout_secs = parse_var("LEDGERSCAN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LEDGERSCAN_MAX_ATTEMPTS") {
            self.max_attempts = parse_var("LEDGERSCAN_MAX_ATTEMPTS", &v)?;
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                var: "max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}
