//! Safety Filter
//!
//! **Question**: Must this message be left alone no matter what?
//!
//! The filter runs before any remote call. A match vetoes labeling,
//! archiving, filter creation, reputation updates and classification.
//!
//! Matching is deliberately broad: protected domain entries match as
//! substrings of the sender domain, so `edu` protects `state.edu` and also
//! `education-news.com`. Senders without an `@` are protected as well.

use std::fmt;

use tracing::info;

use crate::address::domain_part;
use crate::config::EngineConfig;

/// Which rule vetoed a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyMatch {
    /// The sender address has no `@`
    MalformedAddress { address: String },

    /// The sender domain contains a protected fragment
    ProtectedDomain { domain: String, rule: String },

    /// Subject or snippet contains a protected keyword
    ProtectedKeyword { keyword: String },
}

impl SafetyMatch {
    /// The rule that matched, suitable for audit output.
    pub fn rule(&self) -> &str {
        match self {
            SafetyMatch::MalformedAddress { .. } => "malformed-address",
            SafetyMatch::ProtectedDomain { rule, .. } => rule,
            SafetyMatch::ProtectedKeyword { keyword } => keyword,
        }
    }

    /// True for matches that came from the sender rather than the content.
    pub fn is_sender_match(&self) -> bool {
        !matches!(self, SafetyMatch::ProtectedKeyword { .. })
    }
}

impl fmt::Display for SafetyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyMatch::MalformedAddress { address } => {
                write!(f, "malformed sender address '{}'", address)
            }
            SafetyMatch::ProtectedDomain { domain, rule } => {
                write!(f, "protected domain '{}' (rule '{}')", domain, rule)
            }
            SafetyMatch::ProtectedKeyword { keyword } => {
                write!(f, "protected keyword '{}'", keyword)
            }
        }
    }
}

/// Pure predicate layer over the protected domain and keyword lists.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    protected_domains: Vec<String>,
    protected_keywords: Vec<String>,
}

impl SafetyFilter {
    /// Build a filter from explicit lists. Entries are case-folded once here.
    pub fn new<D, K>(protected_domains: D, protected_keywords: K) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            protected_domains: protected_domains
                .into_iter()
                .map(|d| d.as_ref().to_lowercase())
                .collect(),
            protected_keywords: protected_keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Build a filter from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.protected_domains, &config.protected_keywords)
    }

    /// Find the protected fragment contained in `domain`, if any.
    pub fn protected_domain_rule(&self, domain: &str) -> Option<&str> {
        let domain = domain.to_lowercase();
        self.protected_domains
            .iter()
            .find(|rule| domain.contains(rule.as_str()))
            .map(String::as_str)
    }

    /// Check a sender address against the protected domains.
    pub fn check_sender(&self, address: &str) -> Option<SafetyMatch> {
        let Some(domain) = domain_part(address) else {
            info!(sender = address, rule = "malformed-address", "Safety rule matched");
            return Some(SafetyMatch::MalformedAddress {
                address: address.to_string(),
            });
        };

        let rule = self.protected_domain_rule(domain)?;
        let domain = domain.to_lowercase();
        info!(sender = address, domain = %domain, rule, "Safety rule matched: protected domain");

        Some(SafetyMatch::ProtectedDomain {
            domain,
            rule: rule.to_string(),
        })
    }

    /// Check subject and snippet against the protected keywords.
    pub fn check_content(&self, subject: &str, snippet: &str) -> Option<SafetyMatch> {
        let text = format!("{} {}", subject, snippet).to_lowercase();

        let keyword = self
            .protected_keywords
            .iter()
            .find(|kw| text.contains(kw.as_str()))?;
        info!(rule = %keyword, "Safety rule matched: protected keyword");

        Some(SafetyMatch::ProtectedKeyword {
            keyword: keyword.clone(),
        })
    }

    /// Sender first, then content.
    pub fn check_message(&self, address: &str, subject: &str, snippet: &str) -> Option<SafetyMatch> {
        self.check_sender(address)
            .or_else(|| self.check_content(subject, snippet))
    }

    /// True if the sender must not be touched.
    pub fn is_safe_sender(&self, address: &str) -> bool {
        self.check_sender(address).is_some()
    }

    /// True if the content must not be touched.
    pub fn is_safe_content(&self, subject: &str, snippet: &str) -> bool {
        self.check_content(subject, snippet).is_some()
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_protected_domains() {
        let filter = SafetyFilter::default();
        assert!(filter.is_safe_sender("no-reply@accounts.google.com"));
        assert!(filter.is_safe_sender("alerts@chase.com"));
        assert!(filter.is_safe_sender("registrar@state.edu"));
        assert!(!filter.is_safe_sender("news@marketing.com"));
    }

    #[test]
    fn test_domain_match_is_substring() {
        let filter = SafetyFilter::default();
        // "edu" anywhere in the domain is protected, including non-TLD positions.
        assert!(filter.is_safe_sender("hello@education-news.com"));
        assert!(filter.is_safe_sender("deals@military-surplus.shop"));
    }

    #[test]
    fn test_domain_match_is_case_insensitive() {
        let filter = SafetyFilter::default();
        assert!(filter.is_safe_sender("Security@GitHub.COM"));
    }

    #[test]
    fn test_malformed_address_is_protected() {
        let filter = SafetyFilter::default();
        assert!(filter.is_safe_sender("Unknown"));
        assert!(filter.is_safe_sender(""));
        assert_eq!(
            filter.check_sender("Unknown").map(|m| m.rule().to_string()),
            Some("malformed-address".to_string())
        );
    }

    #[test]
    fn test_sender_match_names_rule() {
        let filter = SafetyFilter::default();
        let found = filter.check_sender("billing@paypal.com").unwrap();
        assert_eq!(found.rule(), "paypal.com");
        assert!(found.is_sender_match());
        assert!(found.to_string().contains("paypal.com"));
    }

    #[test]
    fn test_protected_content() {
        let filter = SafetyFilter::default();
        assert!(filter.is_safe_content("Your Invoice", "Please find attached"));
        assert!(filter.is_safe_content("Quarterly update", "TAX documents enclosed"));
        assert!(filter.is_safe_content("Security Alert", "New sign-in detected"));
        assert!(!filter.is_safe_content("Weekly Newsletter", "Check this out"));
    }

    #[test]
    fn test_keyword_may_span_subject_and_snippet() {
        let filter = SafetyFilter::default();
        // Subject and snippet are joined with a single space before matching.
        assert!(filter.is_safe_content("Your new offer", "letter from HR"));
    }

    #[test]
    fn test_content_match_names_keyword() {
        let filter = SafetyFilter::default();
        let found = filter.check_content("Verification Code", "123456").unwrap();
        assert_eq!(found.rule(), "verification code");
        assert!(!found.is_sender_match());
    }

    #[test]
    fn test_check_message_prefers_sender() {
        let filter = SafetyFilter::default();
        let found = filter
            .check_message("no-reply@google.com", "Invoice", "")
            .unwrap();
        assert!(found.is_sender_match());

        assert!(filter
            .check_message("promo@shop.com", "Limited Time Offer", "50% off")
            .is_none());
    }

    #[test]
    fn test_custom_lists() {
        let filter = SafetyFilter::new(["Example.ORG"], ["Refund"]);
        assert!(filter.is_safe_sender("a@mail.example.org"));
        assert!(!filter.is_safe_sender("a@google.com"));
        assert!(filter.is_safe_content("REFUND issued", ""));
        assert!(!filter.is_safe_content("invoice", ""));
    }

    proptest! {
        #[test]
        fn prop_any_domain_containing_protected_fragment_is_safe(
            prefix in "[a-z0-9-]{0,12}",
            suffix in "[a-z0-9.-]{0,12}",
            idx in 0usize..17,
        ) {
            let filter = SafetyFilter::default();
            let fragment = crate::config::DEFAULT_PROTECTED_DOMAINS[idx];
            let address = format!("user@{}{}{}", prefix, fragment, suffix);
            prop_assert!(filter.is_safe_sender(&address));
        }

        #[test]
        fn prop_keyword_match_ignores_case(
            before in "[a-z ]{0,20}",
            after in "[a-z ]{0,20}",
            idx in 0usize..12,
        ) {
            let filter = SafetyFilter::default();
            let keyword = crate::config::DEFAULT_PROTECTED_KEYWORDS[idx].to_uppercase();
            let subject = format!("{}{}{}", before, keyword, after);
            prop_assert!(filter.is_safe_content(&subject, ""));
        }

        #[test]
        fn prop_addresses_without_at_are_safe(raw in "[^@]{0,40}") {
            let filter = SafetyFilter::default();
            prop_assert!(filter.is_safe_sender(&raw));
        }
    }
}
