//! # inboxward-core
//!
//! Deterministic decision and reputation engine for inbox triage.
//!
//! This crate answers, for one message at a time:
//! - Must this message be left alone? ([`SafetyFilter`])
//! - Archive, review or skip? ([`DecisionEngine`])
//! - Has this sender earned an automatic filter? ([`ReputationStore`])
//!
//! ## Key Guarantees
//!
//! 1. **No network calls**: classification and mailbox access live in `inboxward-runtime`
//! 2. **Safety first**: a safety match vetoes every later step
//! 3. **Monotonic trust**: a sender is promoted at most once and never demoted
//! 4. **Write-through**: every reputation update is persisted before returning
//!
//! ## Example
//!
//! ```rust,ignore
//! use inboxward_core::{Engine, EngineConfig, JsonFileStorage, Action};
//!
//! let mut engine = Engine::open(EngineConfig::default(), JsonFileStorage::new("data/senders.json"));
//!
//! if engine.safety.check_message("news@marketing.com", "Weekly digest", "...").is_none() {
//!     let promoted = engine.reputation.update_sender("news@marketing.com", "NEWSLETTER");
//!     let decision = engine.decisions.decide("NEWSLETTER", 0.91);
//!     assert_eq!(decision.action, Action::Archive);
//! }
//! ```

pub mod address;
pub mod config;
pub mod decision;
pub mod reputation;
pub mod safety;

// Re-export main types at crate root
pub use address::{extract_email_address, normalized_domain};
pub use config::{ConfigError, EngineConfig};
pub use decision::{
    is_marketing, label_for, Action, Decision, DecisionEngine, IMPORTANT, LABEL_NAMESPACE,
    MARKETING_CLASSIFICATIONS,
};
pub use reputation::{
    JsonFileStorage, MemoryStorage, ReputationStore, SenderMap, SenderRecord, SenderStorage,
    StorageError, TrustState,
};
pub use safety::{SafetyFilter, SafetyMatch};

/// The three engine components built from one configuration.
pub struct Engine<S: SenderStorage> {
    pub safety: SafetyFilter,
    pub decisions: DecisionEngine,
    pub reputation: ReputationStore<S>,
}

impl<S: SenderStorage> Engine<S> {
    /// Build every component and load the reputation ledger from `storage`.
    pub fn open(config: EngineConfig, storage: S) -> Self {
        Self {
            safety: SafetyFilter::from_config(&config),
            decisions: DecisionEngine::from_config(&config),
            reputation: ReputationStore::open(storage, config.trust_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_pipeline() {
        let mut engine = Engine::open(EngineConfig::default(), MemoryStorage::new());

        assert!(engine
            .safety
            .check_message("news@marketing.com", "Weekly Newsletter", "Top stories")
            .is_none());

        let promoted = engine
            .reputation
            .update_sender("news@marketing.com", "NEWSLETTER");
        assert!(!promoted);

        let decision = engine.decisions.decide("NEWSLETTER", 0.91);
        assert_eq!(decision.action, Action::Archive);
        assert_eq!(decision.label_name.as_deref(), Some("AUTO/Newsletter"));
    }

    #[test]
    fn test_engine_honors_config() {
        let config = EngineConfig {
            archive_threshold: 0.95,
            trust_threshold: 1,
            ..EngineConfig::default()
        };
        let mut engine = Engine::open(config, MemoryStorage::new());

        assert_eq!(engine.decisions.determine_action("PROMOTION", 0.9), Action::Review);
        assert!(engine.reputation.update_sender("promo@shop.com", "PROMOTION"));
    }
}
