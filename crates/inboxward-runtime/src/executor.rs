//! Action and filter execution.
//!
//! Turns engine decisions into mailbox calls. In dry-run mode every
//! mutating call is replaced by a `[DRY RUN]` log event and the mailbox is
//! never touched. The executor does not deduplicate repeated calls.

use std::sync::Arc;
use tracing::{error, info};

use crate::mailbox::Mailbox;
use inboxward_core::{is_marketing, label_for, Action};

/// What happened to one message's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// SKIP; nothing requested
    Skipped,

    /// Dry run; the calls were logged instead
    Simulated,

    /// Label applied, and the message archived when `archived` is set
    Applied { archived: bool },

    /// A mailbox call failed. Archive is never attempted after a failed label.
    Failed(String),
}

/// What happened to a filter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Sender not trusted, or classification not marketing
    NotEligible,
    Simulated,
    Created,
    Failed(String),
}

/// Executes actions against a mailbox.
pub struct ActionExecutor {
    mailbox: Arc<dyn Mailbox>,
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(mailbox: Arc<dyn Mailbox>, dry_run: bool) -> Self {
        Self { mailbox, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Apply `action` to a message.
    ///
    /// ARCHIVE and REVIEW apply the derived label; ARCHIVE then removes the
    /// message from the inbox.
    pub async fn execute_action(
        &self,
        message_id: &str,
        action: Action,
        classification: &str,
    ) -> ExecutionOutcome {
        if action == Action::Skip {
            info!(message_id, classification, "Action: SKIP");
            return ExecutionOutcome::Skipped;
        }

        let label = label_for(classification);
        let archive = action == Action::Archive;

        if self.dry_run {
            info!(message_id, label = %label, "[DRY RUN] Would apply label");
            if archive {
                info!(message_id, "[DRY RUN] Would archive");
            }
            return ExecutionOutcome::Simulated;
        }

        if let Err(e) = self.mailbox.add_label(message_id, &label).await {
            error!(message_id, label = %label, error = %e, "Failed to add label");
            return ExecutionOutcome::Failed(e.to_string());
        }

        if archive {
            if let Err(e) = self.mailbox.archive_message(message_id).await {
                error!(message_id, error = %e, "Failed to archive message");
                return ExecutionOutcome::Failed(e.to_string());
            }
        }

        ExecutionOutcome::Applied { archived: archive }
    }

    /// Create a server-side filter for a trusted marketing sender.
    pub async fn create_filter_if_trusted(
        &self,
        sender: &str,
        classification: &str,
        is_trusted: bool,
    ) -> FilterOutcome {
        if !is_trusted || !is_marketing(classification) {
            return FilterOutcome::NotEligible;
        }

        let label = label_for(classification);

        if self.dry_run {
            info!(sender, label = %label, "[DRY RUN] Would create filter");
            return FilterOutcome::Simulated;
        }

        info!(sender, "Creating filter for trusted sender");
        match self.mailbox.create_filter(sender, &label).await {
            Ok(()) => FilterOutcome::Created,
            Err(e) => {
                error!(sender, label = %label, error = %e, "Failed to create filter");
                FilterOutcome::Failed(e.to_string())
            }
        }
    }
}
