//! In-process mailbox with canned messages.
//!
//! Used by `--mock` runs and as the test double for the executor and the
//! run loop. Every mutating call is recorded.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::{Mailbox, MailboxCall, MailboxError, MessageDetails, MessageRef};
use inboxward_core::extract_email_address;

/// (id, subject, From header, snippet)
const SCENARIOS: &[(&str, &str, &str, &str)] = &[
    (
        "mock_msg_1",
        "Weekly Newsletter",
        "Newsletter <news@marketing.com>",
        "Here are the top stories for this week...",
    ),
    (
        "mock_msg_2",
        "Your Invoice",
        "Billing <billing@service.com>",
        "Please find attached your invoice for...",
    ),
    (
        "mock_msg_3",
        "Limited Time Offer",
        "Promo <promo@shop.com>",
        "50% off everything this weekend only!",
    ),
    (
        "mock_msg_4",
        "Security Alert",
        "Google <no-reply@accounts.google.com>",
        "New sign-in detected on your account.",
    ),
    (
        "mock_msg_5",
        "Meeting Update",
        "John Doe <john.doe@company.com>",
        "Can we reschedule our sync to 3 PM?",
    ),
];

/// Canned mailbox.
#[derive(Debug)]
pub struct SyntheticMailbox {
    messages: Vec<MessageDetails>,
    fail_mutations: bool,
    calls: Mutex<Vec<MailboxCall>>,
}

impl Default for SyntheticMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMailbox {
    /// The five built-in scenarios.
    pub fn new() -> Self {
        let messages = SCENARIOS
            .iter()
            .map(|(id, subject, from, snippet)| message(id, subject, from, snippet))
            .collect();
        info!("Initialized synthetic mailbox");
        Self::with_messages(messages)
    }

    /// A mailbox holding exactly `messages`.
    pub fn with_messages(messages: Vec<MessageDetails>) -> Self {
        Self {
            messages,
            fail_mutations: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every mutating call fail. Failed calls are still recorded.
    pub fn failing_mutations(mut self) -> Self {
        self.fail_mutations = true;
        self
    }

    /// Mutating calls received so far, in order.
    pub fn calls(&self) -> Vec<MailboxCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: MailboxCall) -> Result<(), MailboxError> {
        self.calls.lock().push(call);
        if self.fail_mutations {
            Err(MailboxError::Rejected("synthetic mailbox is read-only".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Build a message the way the adapter would from raw headers.
pub(crate) fn message(id: &str, subject: &str, from: &str, snippet: &str) -> MessageDetails {
    MessageDetails {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: from.to_string(),
        email_address: extract_email_address(from),
        snippet: snippet.to_string(),
        thread_id: format!("thread_{}", id),
    }
}

#[async_trait]
impl Mailbox for SyntheticMailbox {
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        info!(query, limit = max_results, "[MOCK] Listing messages");
        Ok(self
            .messages
            .iter()
            .take(max_results)
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_message_details(&self, id: &str) -> Result<Option<MessageDetails>, MailboxError> {
        info!(message_id = id, "[MOCK] Getting details");
        let details = self
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .unwrap_or_else(|| {
                message(
                    id,
                    "Unknown Subject",
                    "Unknown <unknown@example.com>",
                    "Lorem ipsum...",
                )
            });
        Ok(Some(details))
    }

    async fn add_label(&self, id: &str, label_name: &str) -> Result<(), MailboxError> {
        info!(message_id = id, label = label_name, "[MOCK] Added label");
        self.record(MailboxCall::AddLabel {
            message_id: id.to_string(),
            label: label_name.to_string(),
        })
    }

    async fn archive_message(&self, id: &str) -> Result<(), MailboxError> {
        info!(message_id = id, "[MOCK] Archived message");
        self.record(MailboxCall::Archive {
            message_id: id.to_string(),
        })
    }

    async fn create_filter(&self, sender: &str, label_name: &str) -> Result<(), MailboxError> {
        info!(sender, label = label_name, "[MOCK] Created filter");
        self.record(MailboxCall::CreateFilter {
            sender: sender.to_string(),
            label: label_name.to_string(),
        })
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
