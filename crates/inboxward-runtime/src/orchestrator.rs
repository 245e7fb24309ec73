//! Run loop for one triage pass.
//!
//! Messages are handled strictly one at a time:
//! 1. Fetch details (absent details skip the message)
//! 2. Safety filter: sender, then content. A match vetoes everything below
//! 3. Classify (failures resolve to IMPORTANT / 0.0)
//! 4. Update sender reputation
//! 5. Decide and execute the action
//! 6. Create a filter, only on the update that promoted the sender

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::executor::{ActionExecutor, ExecutionOutcome, FilterOutcome};
use crate::mailbox::Mailbox;
use crate::providers::{Classification, Classifier};
use inboxward_core::{Action, Decision, Engine, SafetyMatch, SenderStorage};

/// How one message was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Details could not be fetched
    Unavailable,

    /// Vetoed by the safety filter before classification
    Protected(SafetyMatch),

    Processed {
        classification: Classification,
        decision: Decision,
        promoted: bool,
        execution: ExecutionOutcome,
        filter: Option<FilterOutcome>,
    },
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seen: usize,
    pub unavailable: usize,
    pub protected_sender: usize,
    pub protected_content: usize,
    pub archived: usize,
    pub reviewed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub promotions: usize,
    pub filters_created: usize,

    /// The sender store could not be written at the end of the run
    pub unsaved_reputation: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        self.seen += 1;
        match outcome {
            MessageOutcome::Unavailable => self.unavailable += 1,
            MessageOutcome::Protected(matched) if matched.is_sender_match() => {
                self.protected_sender += 1
            }
            MessageOutcome::Protected(_) => self.protected_content += 1,
            MessageOutcome::Processed {
                decision,
                promoted,
                execution,
                filter,
                ..
            } => {
                if *promoted {
                    self.promotions += 1;
                }
                if matches!(filter, Some(FilterOutcome::Created)) {
                    self.filters_created += 1;
                }
                match (execution, decision.action) {
                    (ExecutionOutcome::Failed(_), _) => self.failed += 1,
                    (_, Action::Archive) => self.archived += 1,
                    (_, Action::Review) => self.reviewed += 1,
                    (_, Action::Skip) => self.skipped += 1,
                }
            }
        }
    }
}

/// Drives messages from a mailbox through the engine.
pub struct RunOrchestrator<S: SenderStorage> {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<dyn Classifier>,
    engine: Engine<S>,
    executor: ActionExecutor,
}

impl<S: SenderStorage> RunOrchestrator<S> {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<dyn Classifier>,
        engine: Engine<S>,
        dry_run: bool,
    ) -> Self {
        let executor = ActionExecutor::new(mailbox.clone(), dry_run);
        Self {
            mailbox,
            classifier,
            engine,
            executor,
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Process up to `limit` messages matching `query`.
    ///
    /// Listing failures end the run with nothing processed.
    pub async fn run(&mut self, query: &str, limit: usize) -> RunSummary {
        let messages = match self.mailbox.list_messages(query, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(mailbox = self.mailbox.name(), error = %e, "Failed to list messages");
                Vec::new()
            }
        };
        info!(count = messages.len(), query, "Found messages to process");

        let mut summary = RunSummary::default();
        for message in &messages {
            let outcome = self.process_message(&message.id).await;
            summary.record(&outcome);
        }

        summary.unsaved_reputation = self.engine.reputation.has_unsaved_changes();
        summary
    }

    /// Run one message through every step.
    pub async fn process_message(&mut self, id: &str) -> MessageOutcome {
        let details = match self.mailbox.get_message_details(id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                warn!(message_id = id, "Message not found");
                return MessageOutcome::Unavailable;
            }
            Err(e) => {
                error!(message_id = id, error = %e, "Failed to get message details");
                return MessageOutcome::Unavailable;
            }
        };

        info!(
            message_id = id,
            subject = %details.subject,
            sender = %details.sender,
            "Processing message"
        );

        if let Some(matched) = self.engine.safety.check_message(
            &details.email_address,
            &details.subject,
            &details.snippet,
        ) {
            info!(message_id = id, reason = %matched, "Skipping protected message");
            return MessageOutcome::Protected(matched);
        }

        let classification = self
            .classifier
            .classify(&details.subject, &details.snippet, &details.sender)
            .await;
        info!(
            message_id = id,
            label = %classification.label,
            confidence = classification.confidence,
            "Classified message"
        );

        let address = &details.email_address;
        let promoted = self
            .engine
            .reputation
            .update_sender(address, &classification.label);
        let is_trusted = self.engine.reputation.is_trusted(address);

        let decision = self
            .engine
            .decisions
            .decide(&classification.label, classification.confidence);

        let execution = self
            .executor
            .execute_action(&details.id, decision.action, &classification.label)
            .await;

        let filter = if promoted {
            info!(sender = %address, "Sender just became trusted");
            Some(
                self.executor
                    .create_filter_if_trusted(address, &classification.label, is_trusted)
                    .await,
            )
        } else {
            None
        };

        MessageOutcome::Processed {
            classification,
            decision,
            promoted,
            execution,
            filter,
        }
    }
}
