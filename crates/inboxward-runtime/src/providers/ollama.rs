//! Ollama classification provider.
//!
//! Calls the non-streaming `/api/generate` endpoint in JSON mode. One
//! attempt per message; the configured timeout bounds the call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Classification, Classifier, ProviderError};
use crate::config::ClassifierConfig;
use crate::prompts::{build_classification_prompt, parse_classification};

/// Classifier backed by a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaClassifier {
    url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaClassifier {
    /// Build a classifier from configuration.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    async fn try_classify(
        &self,
        subject: &str,
        snippet: &str,
        sender: &str,
    ) -> Result<Classification, ProviderError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_classification_prompt(subject, snippet, sender),
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<OllamaError>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::ParseError(e.to_string())
            }
        })?;

        let classification = parse_classification(&body.response)?;
        debug!(
            model = %self.model,
            label = %classification.label,
            confidence = classification.confidence,
            "Ollama classification"
        );
        Ok(classification)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
