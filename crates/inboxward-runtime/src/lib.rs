//! # inboxward-runtime
//!
//! Adapters and the run loop around `inboxward-core`.
//!
//! The core crate decides; this crate talks to the outside world:
//! - [`Mailbox`] adapters: Gmail REST ([`GmailMailbox`]) and a canned
//!   [`SyntheticMailbox`]
//! - [`Classifier`] providers: Ollama ([`OllamaClassifier`])
//! - [`ActionExecutor`]: labels, archives and filters, with dry-run substitution
//! - [`RunOrchestrator`]: the sequential per-message pipeline
//!
//! ## Failure handling
//!
//! Remote calls make one attempt bounded by a timeout. Transport failures
//! resolve to safe defaults (empty list, absent message, `IMPORTANT` at 0.0)
//! and the run moves on. Startup failures ([`RuntimeError`]) are fatal.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inboxward_core::{Engine, EngineConfig, JsonFileStorage};
//! use inboxward_runtime::{OllamaClassifier, RunOrchestrator, RuntimeConfig, SyntheticMailbox};
//!
//! let config = RuntimeConfig::default();
//! let engine = Engine::open(EngineConfig::default(), JsonFileStorage::new(&config.storage.senders_file));
//! let classifier = Arc::new(OllamaClassifier::new(&config.classifier)?);
//!
//! let mut run = RunOrchestrator::new(Arc::new(SyntheticMailbox::new()), classifier, engine, true);
//! let summary = run.run("is:unread", 10).await;
//! ```

pub mod auth;
pub mod config;
pub mod executor;
pub mod mailbox;
pub mod orchestrator;
pub mod prompts;
pub mod providers;

#[cfg(all(test, feature = "gmail"))]
mod testing;

pub use auth::{AuthError, GmailCredentials, GMAIL_SCOPES};
pub use config::{ClassifierConfig, GmailConfig, LoggingConfig, RuntimeConfig, StorageConfig};
pub use executor::{ActionExecutor, ExecutionOutcome, FilterOutcome};
pub use mailbox::{Mailbox, MailboxCall, MailboxError, MessageDetails, MessageRef, SyntheticMailbox};
pub use orchestrator::{MessageOutcome, RunOrchestrator, RunSummary};
pub use providers::{Classification, Classifier, ProviderError};

#[cfg(feature = "gmail")]
pub use mailbox::GmailMailbox;
#[cfg(feature = "ollama")]
pub use providers::OllamaClassifier;

use inboxward_core::ConfigError;
use thiserror::Error;

/// Fatal startup errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Mailbox setup failed: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Classifier setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Authorize (token file, one refresh, or browser consent) and build the
/// Gmail adapter.
#[cfg(feature = "gmail")]
pub async fn connect_gmail(
    config: &GmailConfig,
    safety: inboxward_core::SafetyFilter,
) -> Result<GmailMailbox, RuntimeError> {
    let credentials = GmailCredentials::authorize(config).await?;
    Ok(GmailMailbox::new(config, &credentials, safety)?)
}
