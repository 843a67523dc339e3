//! Server configuration from YAML and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// SFU connection settings.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Key for the completion provider; falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub openai_api_key: String,

    /// Port the HTTP surface listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SFU credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "livegpt_agent=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration: set LIVEGPT_CONFIG_FILE or LIVEGPT_CONFIG_BODY")]
    Missing,

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl Config {
    /// Parses a YAML config body.
    pub fn from_yaml(body: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(body)?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Resolves configuration from the environment:
    /// `LIVEGPT_CONFIG_BODY` (inline YAML) wins over
    /// `LIVEGPT_CONFIG_FILE` (path); one of the two is required.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(body) = std::env::var("LIVEGPT_CONFIG_BODY") {
            if !body.trim().is_empty() {
                return Self::from_yaml(&body);
            }
        }

        if let Ok(path) = std::env::var("LIVEGPT_CONFIG_FILE") {
            if !path.trim().is_empty() {
                let body = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::FileRead { path, source })?;
                return Self::from_yaml(&body);
            }
        }

        Err(ConfigError::Missing)
    }

    fn apply_env_fallbacks(&mut self) {
        if self.openai_api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.openai_api_key = key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(
            r#"
livekit:
  url: wss://sfu.example.com
  api_key: key
  secret_key: secret
openai_api_key: sk-test
port: 9000
logging:
  level: debug
  json: true
"#,
        )
        .unwrap();

        assert_eq!(config.livekit.url, "wss://sfu.example.com");
        assert_eq!(config.livekit.api_key, "key");
        assert_eq!(config.livekit.secret_key, "secret");
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = Config::from_yaml("livekit:\n  url: ws://localhost:7880\n").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(Config::from_yaml("livekit: [not a map").is_err());
    }
}
