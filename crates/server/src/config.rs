use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ledgerscan_extract::{ConfigError, ExtractionConfig};
use serde::Deserialize;

use crate::state::{SessionLimits, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Bunyan-style JSON lines.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    /// Seconds a session may sit untouched before it is evicted.
    pub session_idle_secs: u64,
    pub max_sessions: usize,
    pub extraction: ExtractionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_format: LogFormat::default(),
            session_idle_secs: DEFAULT_SESSION_IDLE.as_secs(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the TOML file named by `LEDGERSCAN_CONFIG`, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup("LEDGERSCAN_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_overrides(lookup)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            idle_timeout: Duration::from_secs(self.session_idle_secs),
            max_sessions: self.max_sessions,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LEDGERSCAN_BIND") {
            self.bind_addr = parse_var("LEDGERSCAN_BIND", &v)?;
        }
        if let Some(v) = lookup("LEDGERSCAN_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("LEDGERSCAN_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("LEDGERSCAN_LOG_FORMAT") {
            self.log_format = parse_var("LEDGERSCAN_LOG_FORMAT", &v)?;
        }
        if let Some(v) = lookup("LEDGERSCAN_SESSION_IDLE_SECS") {
            self.session_idle_secs = parse_var("LEDGERSCAN_SESSION_IDLE_SECS", &v)?;
        }
        if let Some(v) = lookup("LEDGERSCAN_MAX_SESSIONS") {
            self.max_sessions = parse_var("LEDGERSCAN_MAX_SESSIONS", &v)?;
        }
        self.extraction = self.extraction.with_overrides(&lookup)?;
        Ok(self)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: Vec<(&str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = ServerConfig::load_with(lookup(vec![])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgerscan.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:9000"
log_format = "json"

[extraction]
model = "file-model"
max_attempts = 2
"#,
        )
        .unwrap();

        let config = ServerConfig::load_with(lookup(vec![
            ("LEDGERSCAN_CONFIG", path.display().to_string()),
            ("LEDGERSCAN_BIND", "127.0.0.1:7000".to_string()),
            ("LEDGERSCAN_MODEL", "env-model".to_string()),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.extraction.model, "env-model");
        assert_eq!(config.extraction.max_attempts, 2);
    }

    #[test]
    fn bad_bind_address_is_an_error() {
        let err = ServerConfig::load_with(lookup(vec![(
            "LEDGERSCAN_BIND",
            "not an address".to_string(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn session_limits_from_env() {
        let config = ServerConfig::load_with(lookup(vec![
            ("LEDGERSCAN_SESSION_IDLE_SECS", "90".to_string()),
            ("LEDGERSCAN_MAX_SESSIONS", "8".to_string()),
        ]))
        .unwrap();
        assert_eq!(
            config.session_limits(),
            SessionLimits {
                idle_timeout: Duration::from_secs(90),
                max_sessions: 8,
            }
        );
        assert_eq!(
            ServerConfig::default().session_limits(),
            SessionLimits::default()
        );
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
