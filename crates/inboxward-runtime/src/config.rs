//! Runtime configuration for adapters, storage and logging.
//!
//! Durations are written as humantime strings (`30s`, `1m 30s`).

use inboxward_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for every runtime adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub classifier: ClassifierConfig,
    pub gmail: GmailConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Remote classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ollama generate endpoint
    pub url: String,

    /// Model name
    pub model: String,

    /// Per-call timeout; the only cancellation for a classification
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gmail REST adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// Base URL for the authenticated user
    pub base_url: String,

    /// Authorized-user token file, written after consent or refresh
    pub token_file: PathBuf,

    /// OAuth client secrets for the consent flow
    pub credentials_file: PathBuf,

    /// How long to wait for the user to finish consent in the browser
    #[serde(with = "humantime_duration")]
    pub consent_timeout: Duration,

    /// Search query for messages to process
    pub query: String,

    /// Per-request timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gmail.googleapis.com/gmail/v1/users/me".to_string(),
            token_file: PathBuf::from("token.json"),
            credentials_file: PathBuf::from("credentials.json"),
            consent_timeout: Duration::from_secs(300),
            query: "is:unread".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Reputation store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub senders_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            senders_file: PathBuf::from("data/senders.json"),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON log file; `null` disables file logging
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: Some(PathBuf::from("logs/agent.log")),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Check URLs and timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("classifier.url", &self.classifier.url),
            ("gmail.base_url", &self.gmail.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "{} must start with http:// or https://",
                    name
                )));
            }
        }

        for (name, timeout) in [
            ("classifier.timeout", self.classifier.timeout),
            ("gmail.timeout", self.gmail.timeout),
            ("gmail.consent_timeout", self.gmail.consent_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.classifier.model, "llama3");
        assert_eq!(config.classifier.timeout, Duration::from_secs(30));
        assert_eq!(config.gmail.query, "is:unread");
        assert_eq!(config.gmail.credentials_file, PathBuf::from("credentials.json"));
        assert_eq!(config.gmail.consent_timeout, Duration::from_secs(300));
        assert_eq!(config.storage.senders_file, PathBuf::from("data/senders.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_humantime() {
        let config = RuntimeConfig::from_yaml(
            r#"
classifier:
  model: "mistral"
  timeout: "1m 30s"
gmail:
  query: "in:inbox newer_than:2d"
logging:
  log_file: null
"#,
        )
        .unwrap();

        assert_eq!(config.classifier.model, "mistral");
        assert_eq!(config.classifier.timeout, Duration::from_secs(90));
        assert_eq!(config.classifier.url, ClassifierConfig::default().url);
        assert_eq!(config.gmail.query, "in:inbox newer_than:2d");
        assert!(config.logging.log_file.is_none());
    }

    #[test]
    fn test_round_trip_yaml() {
        let config = RuntimeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = RuntimeConfig::from_yaml("classifier:\n  url: \"localhost:11434\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = RuntimeConfig::from_yaml("gmail:\n  timeout: \"soon\"\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = RuntimeConfig::from_yaml("gmail:\n  timeout: \"0s\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
