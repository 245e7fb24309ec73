//! Engine configuration.
//!
//! Thresholds and protected lists are plain data passed down to the
//! components that need them. Everything has a default, so an empty YAML
//! document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default confidence required to archive automatically.
pub const DEFAULT_ARCHIVE_THRESHOLD: f64 = 0.80;

/// Default confidence required to label for review (message stays in the inbox).
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.55;

/// Default number of marketing classifications before a sender is trusted.
pub const DEFAULT_TRUST_THRESHOLD: u32 = 3;

/// Domains that are never touched. Matched as substrings of the sender domain.
pub const DEFAULT_PROTECTED_DOMAINS: &[&str] = &[
    "google.com",
    "apple.com",
    "amazon.com",
    "microsoft.com",
    "gov",
    "edu",
    "mil",
    "chase.com",
    "bankofamerica.com",
    "wellsfargo.com",
    "citi.com",
    "amex.com",
    "stripe.com",
    "paypal.com",
    "linkedin.com",
    "github.com",
    "gitlab.com",
];

/// Subject/snippet keywords that are never touched.
pub const DEFAULT_PROTECTED_KEYWORDS: &[&str] = &[
    "offer letter",
    "interview",
    "invoice",
    "payment",
    "receipt",
    "security alert",
    "verification code",
    "password reset",
    "tax",
    "legal",
    "contract",
    "agreement",
];

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Tunables for the safety filter, decision engine and reputation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence at or above which a message is archived
    pub archive_threshold: f64,

    /// Confidence at or above which a message is labeled for review
    pub review_threshold: f64,

    /// Cumulative marketing classifications needed for trust
    pub trust_threshold: u32,

    /// Protected domain fragments
    pub protected_domains: Vec<String>,

    /// Protected content keywords
    pub protected_keywords: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            archive_threshold: DEFAULT_ARCHIVE_THRESHOLD,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            trust_threshold: DEFAULT_TRUST_THRESHOLD,
            protected_domains: DEFAULT_PROTECTED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            protected_keywords: DEFAULT_PROTECTED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Check threshold ranges and ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("archive_threshold", self.archive_threshold),
            ("review_threshold", self.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.review_threshold > self.archive_threshold {
            return Err(ConfigError::ValidationError(format!(
                "review_threshold ({}) must not exceed archive_threshold ({})",
                self.review_threshold, self.archive_threshold
            )));
        }

        if self.trust_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "trust_threshold must be at least 1".to_string(),
            ));
        }

        if self
            .protected_domains
            .iter()
            .chain(self.protected_keywords.iter())
            .any(|entry| entry.trim().is_empty())
        {
            // An empty fragment would match every sender.
            return Err(ConfigError::ValidationError(
                "protected entries must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
