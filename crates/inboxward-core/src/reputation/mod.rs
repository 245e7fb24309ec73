//! Sender reputation ledger.
//!
//! Each sender moves through a single forward transition:
//!
//! ```text
//! unknown ──first message──▶ untrusted(counts) ──marketing sum ≥ threshold──▶ trusted
//! ```
//!
//! Once trusted, the stored flag is authoritative. Trust is never recomputed
//! from the counts, so a record stays trusted even if its counts are later
//! edited or drift.
//!
//! The store is loaded once and written through on every update. A failed
//! write is logged and leaves the in-memory state ahead of the durable one;
//! [`ReputationStore::has_unsaved_changes`] reports that gap.

mod storage;

pub use storage::{JsonFileStorage, MemoryStorage, SenderMap, SenderStorage, StorageError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::address::normalized_domain;
use crate::decision::{is_marketing, MARKETING_CLASSIFICATIONS};

/// Trust state of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrustState {
    Untrusted,
    Trusted { since: DateTime<Utc> },
}

/// Classification history for one sender address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderRecord {
    /// Lookup key, case preserved
    pub address: String,

    /// Lower-cased part after `@`, fixed at creation
    pub domain: String,

    /// Occurrences per classification label
    pub classification_counts: BTreeMap<String, u32>,

    /// Time of the most recent update
    pub last_seen: DateTime<Utc>,

    /// Trusted-marketing state
    pub trust: TrustState,
}

impl SenderRecord {
    /// A fresh record with no history.
    pub fn new(address: impl Into<String>, now: DateTime<Utc>) -> Self {
        let address = address.into();
        Self {
            domain: normalized_domain(&address),
            address,
            classification_counts: BTreeMap::new(),
            last_seen: now,
            trust: TrustState::Untrusted,
        }
    }

    /// Count one more occurrence of `classification`.
    pub fn record_classification(&mut self, classification: &str, now: DateTime<Utc>) {
        self.last_seen = now;
        *self
            .classification_counts
            .entry(classification.to_string())
            .or_insert(0) += 1;
    }

    /// Occurrences of a single classification.
    pub fn count(&self, classification: &str) -> u32 {
        self.classification_counts
            .get(classification)
            .copied()
            .unwrap_or(0)
    }

    /// Sum of counts over the marketing classifications.
    pub fn marketing_count(&self) -> u32 {
        MARKETING_CLASSIFICATIONS.iter().map(|c| self.count(c)).sum()
    }

    /// Whether the sender is a trusted marketing source.
    pub fn trusted_marketing(&self) -> bool {
        matches!(self.trust, TrustState::Trusted { .. })
    }

    /// Move to trusted. Returns false if the record was already trusted.
    pub fn promote(&mut self, now: DateTime<Utc>) -> bool {
        if self.trusted_marketing() {
            return false;
        }
        self.trust = TrustState::Trusted { since: now };
        true
    }
}

/// Process-wide sender ledger backed by a [`SenderStorage`].
///
/// Updates take `&mut self`, so the read-modify-write in
/// [`update_sender`](Self::update_sender) cannot interleave for a sender.
/// Sharing the store across tasks would need a lock around that whole call
/// to keep promotions reported at most once.
pub struct ReputationStore<S: SenderStorage> {
    storage: S,
    records: SenderMap,
    trust_threshold: u32,
    unsaved: bool,
}

impl<S: SenderStorage> ReputationStore<S> {
    /// Load the ledger. Missing or unreadable storage starts an empty ledger.
    pub fn open(storage: S, trust_threshold: u32) -> Self {
        let records = match storage.load() {
            Ok(records) => {
                info!(
                    location = %storage.location(),
                    senders = records.len(),
                    "Loaded sender store"
                );
                records
            }
            Err(StorageError::NotFound(path)) => {
                info!(path = %path.display(), "No sender store yet, starting empty");
                SenderMap::new()
            }
            Err(e) => {
                error!(
                    error = %e,
                    location = %storage.location(),
                    "Failed to load sender store, starting empty; the file will be replaced on the next update"
                );
                SenderMap::new()
            }
        };

        Self {
            storage,
            records,
            trust_threshold,
            unsaved: false,
        }
    }

    /// Record a classification for `address`.
    ///
    /// Returns true only on the call that promotes the sender to trusted.
    pub fn update_sender(&mut self, address: &str, classification: &str) -> bool {
        self.update_sender_at(address, classification, Utc::now())
    }

    /// [`update_sender`](Self::update_sender) with an explicit clock reading.
    pub fn update_sender_at(
        &mut self,
        address: &str,
        classification: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let trust_threshold = self.trust_threshold;
        let record = self
            .records
            .entry(address.to_string())
            .or_insert_with(|| SenderRecord::new(address, now));

        record.record_classification(classification, now);

        let mut promoted = false;
        if is_marketing(classification) && record.marketing_count() >= trust_threshold {
            promoted = record.promote(now);
        }

        if promoted {
            info!(
                sender = address,
                marketing_count = record.marketing_count(),
                "Sender promoted to trusted marketing source"
            );
        } else {
            debug!(sender = address, classification, "Sender history updated");
        }

        self.persist();
        promoted
    }

    /// Whether `address` is a trusted marketing source.
    pub fn is_trusted(&self, address: &str) -> bool {
        self.records
            .get(address)
            .is_some_and(SenderRecord::trusted_marketing)
    }

    /// Stored record for `address`.
    pub fn get_record(&self, address: &str) -> Option<&SenderRecord> {
        self.records.get(address)
    }

    /// Number of known senders.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the last write failed and memory is ahead of storage.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// The backing storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn persist(&mut self) {
        match self.storage.save(&self.records) {
            Ok(()) => self.unsaved = false,
            Err(e) => {
                // In-memory state stays authoritative for the rest of the run.
                error!(error = %e, location = %self.storage.location(), "Failed to save sender store");
                self.unsaved = true;
            }
        }
    }
}
