//! Classification provider abstractions.
//!
//! A provider turns (subject, snippet, sender) into a classification label
//! and a confidence. Callers use [`Classifier::classify`], which never
//! fails: any transport or parse error resolves to `IMPORTANT` with zero
//! confidence, which the decision engine always maps to SKIP.

use async_trait::async_trait;
use inboxward_core::IMPORTANT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[cfg(feature = "ollama")]
mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::OllamaClassifier;

/// Errors from classification providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// A classification label and the provider's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Upper-cased category, e.g. `NEWSLETTER`
    pub label: String,

    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// `IMPORTANT` at zero confidence; always routes to SKIP.
    pub fn safe_default() -> Self {
        Self::new(IMPORTANT, 0.0)
    }
}

/// Remote classification adapter.
///
/// Implementations make a single attempt per call, bounded by their
/// configured timeout. There is no retry.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a message, surfacing failures.
    async fn try_classify(
        &self,
        subject: &str,
        snippet: &str,
        sender: &str,
    ) -> Result<Classification, ProviderError>;

    /// Provider name for log output.
    fn name(&self) -> &str;

    /// Classify a message, resolving failures to [`Classification::safe_default`].
    async fn classify(&self, subject: &str, snippet: &str, sender: &str) -> Classification {
        match self.try_classify(subject, snippet, sender).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(provider = self.name(), error = %e, "Classification failed, treating as IMPORTANT");
                Classification::safe_default()
            }
        }
    }
}
