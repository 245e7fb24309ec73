//! Decision Engine: maps a classification and confidence to an action.
//!
//! The policy is ordered, first match wins:
//! 1. `IMPORTANT` → SKIP, whatever the confidence
//! 2. confidence ≥ archive threshold → ARCHIVE
//! 3. confidence ≥ review threshold → REVIEW
//! 4. otherwise → SKIP
//!
//! Thresholds are inclusive. A NaN confidence compares false everywhere and
//! therefore lands on SKIP.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EngineConfig;

/// Classification that always routes to SKIP.
pub const IMPORTANT: &str = "IMPORTANT";

/// Classifications eligible for trust accumulation and filter automation.
pub const MARKETING_CLASSIFICATIONS: [&str; 4] = ["NEWSLETTER", "PROMOTION", "COURSE", "OUTREACH"];

/// Namespace prefix for every label the engine applies.
pub const LABEL_NAMESPACE: &str = "AUTO";

/// Whether a classification belongs to the marketing set.
pub fn is_marketing(classification: &str) -> bool {
    MARKETING_CLASSIFICATIONS.contains(&classification)
}

/// Label name for a classification: `NEWSLETTER` → `AUTO/Newsletter`.
///
/// The first character is upper-cased and the rest lower-cased. Both the
/// action executor and filter creation go through this function.
pub fn label_for(classification: &str) -> String {
    let mut chars = classification.chars();
    let display: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    format!("{}/{}", LABEL_NAMESPACE, display)
}

/// What to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Label and remove from the inbox
    Archive,
    /// Label, keep in the inbox
    Review,
    /// Leave untouched
    Skip,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Archive => "ARCHIVE",
            Action::Review => "REVIEW",
            Action::Skip => "SKIP",
        }
    }

    /// True for actions that apply a label.
    pub fn is_labeling(&self) -> bool {
        !matches!(self, Action::Skip)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action together with the classification it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub classification: String,

    /// Present for every action except SKIP
    pub label_name: Option<String>,
}

/// Confidence-to-action mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionEngine {
    archive_threshold: f64,
    review_threshold: f64,
}

impl DecisionEngine {
    pub fn new(archive_threshold: f64, review_threshold: f64) -> Self {
        Self {
            archive_threshold,
            review_threshold,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.archive_threshold, config.review_threshold)
    }

    /// Pick an action for a classification.
    pub fn determine_action(&self, classification: &str, confidence: f64) -> Action {
        if classification == IMPORTANT {
            return Action::Skip;
        }

        if confidence >= self.archive_threshold {
            Action::Archive
        } else if confidence >= self.review_threshold {
            Action::Review
        } else {
            Action::Skip
        }
    }

    /// Pick an action and resolve its label.
    pub fn decide(&self, classification: &str, confidence: f64) -> Decision {
        let action = self.determine_action(classification, confidence);
        Decision {
            action,
            classification: classification.to_string(),
            label_name: action.is_labeling().then(|| label_for(classification)),
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
