//! Mailbox adapters.
//!
//! The run loop talks to a mailbox through the [`Mailbox`] capability. Two
//! implementations exist: [`GmailMailbox`] for the Gmail REST API and
//! [`SyntheticMailbox`] for canned scenarios and tests. Label-name to id
//! resolution and the protected-domain filter check belong to the adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "gmail")]
mod gmail;
mod synthetic;

#[cfg(feature = "gmail")]
pub use gmail::GmailMailbox;
pub use synthetic::SyntheticMailbox;

/// Errors from mailbox adapters.
#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    ParseError(String),

    #[error("Failed to resolve label {label}: {reason}")]
    LabelError { label: String, reason: String },

    #[error("Refused to create a filter for protected sender {0}")]
    ProtectedSender(String),

    #[error("Mailbox rejected the request: {0}")]
    Rejected(String),
}

/// A listed message, before its details are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

/// Headers and snippet of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetails {
    pub id: String,
    pub subject: String,

    /// Raw `From` header
    pub sender: String,

    /// Bare address extracted from `sender`
    pub email_address: String,
    pub snippet: String,
    pub thread_id: String,
}

/// A mutating request made against a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxCall {
    AddLabel { message_id: String, label: String },
    Archive { message_id: String },
    CreateFilter { sender: String, label: String },
}

/// Mailbox capability used by the executor and the run loop.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List messages matching a search query, newest first.
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError>;

    /// Fetch one message. `Ok(None)` when the message no longer exists.
    async fn get_message_details(&self, id: &str) -> Result<Option<MessageDetails>, MailboxError>;

    /// Apply a label by display name, creating the label if needed.
    async fn add_label(&self, id: &str, label_name: &str) -> Result<(), MailboxError>;

    /// Remove the message from the inbox view.
    async fn archive_message(&self, id: &str) -> Result<(), MailboxError>;

    /// Route all future mail from `sender` to `label_name`, skipping the inbox.
    async fn create_filter(&self, sender: &str, label_name: &str) -> Result<(), MailboxError>;

    /// Adapter name for log output.
    fn name(&self) -> &str;
}
