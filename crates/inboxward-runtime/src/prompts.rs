//! Classification prompt and reply parsing.
//!
//! The model is asked for a single JSON object. Replies are read leniently:
//! the label is upper-cased, a missing label means `IMPORTANT`, a missing
//! confidence means 0.0, and confidence is clamped into [0, 1].

use inboxward_core::IMPORTANT;
use serde_json::Value as JsonValue;

use crate::providers::{Classification, ProviderError};

/// Categories offered to the model, in prompt order.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("NEWSLETTER", "recurring editorial or digest content"),
    ("PROMOTION", "sales, discounts, product announcements"),
    ("OUTREACH", "cold outreach, recruiting, partnership pitches"),
    ("COURSE", "course, webinar or learning platform mail"),
    ("IMPORTANT", "personal, work, bills, legal, medical, anything else"),
];

/// Build the classification prompt for one message.
pub fn build_classification_prompt(subject: &str, snippet: &str, sender: &str) -> String {
    let mut prompt = String::from(
        "You are an email classifier. Classify the following email into one of these categories:\n",
    );
    for (name, hint) in CATEGORIES {
        prompt.push_str(&format!("- {} ({})\n", name, hint));
    }

    prompt.push_str(&format!(
        "\nSender: {}\nSubject: {}\nSnippet: {}\n",
        sender, subject, snippet
    ));
    prompt.push_str(
        "\nRespond with JSON only:\n{\n  \"classification\": \"CATEGORY\",\n  \"confidence\": 0.0 to 1.0\n}\n",
    );
    prompt
}

/// Parse the model's reply into a classification.
pub fn parse_classification(reply: &str) -> Result<Classification, ProviderError> {
    let value = parse_json_object(reply)?;

    let label = value
        .get("classification")
        .and_then(JsonValue::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| IMPORTANT.to_string());

    let confidence = match value.get("confidence") {
        None | Some(JsonValue::Null) => 0.0,
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            ProviderError::ParseError(format!("confidence is not a number: {:?}", s))
        })?,
        Some(other) => {
            return Err(ProviderError::ParseError(format!(
                "confidence has unexpected type: {}",
                other
            )))
        }
    };

    if !confidence.is_finite() {
        return Err(ProviderError::ParseError(format!(
            "confidence is not finite: {}",
            confidence
        )));
    }

    Ok(Classification::new(label, confidence.clamp(0.0, 1.0)))
}

/// Parse a JSON object, tolerating prose around it.
fn parse_json_object(reply: &str) -> Result<JsonValue, ProviderError> {
    let trimmed = reply.trim();
    let candidate = match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(value) => value,
        Err(first_error) => {
            let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
                return Err(ProviderError::ParseError(first_error.to_string()));
            };
            if end < start {
                return Err(ProviderError::ParseError(first_error.to_string()));
            }
            serde_json::from_str(&trimmed[start..=end])
                .map_err(|e| ProviderError::ParseError(e.to_string()))?
        }
    };

    if candidate.is_object() {
        Ok(candidate)
    } else {
        Err(ProviderError::ParseError(format!(
            "expected a JSON object, got: {}",
            candidate
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_confidence_always_in_range(confidence in -1.0e6f64..1.0e6, label in "[a-z]{1,12}") {
            let reply = serde_json::json!({ "classification": &label, "confidence": confidence }).to_string();
            let parsed = parse_classification(&reply).unwrap();
            prop_assert!((0.0..=1.0).contains(&parsed.confidence));
            prop_assert_eq!(parsed.label, label.to_uppercase());
        }
    }

    #[test]
    fn test_prompt_contains_message_and_categories() {
        let prompt = build_classification_prompt("Weekly Newsletter", "Top stories", "news@marketing.com");
        for (name, _) in CATEGORIES {
            assert!(prompt.contains(name));
        }
        assert!(prompt.contains("Subject: Weekly Newsletter"));
        assert!(prompt.contains("Snippet: Top stories"));
        assert!(prompt.contains("Sender: news@marketing.com"));
        assert!(prompt.contains("JSON only"));
    }

    #[test]
    fn test_parse_plain_reply() {
        let parsed = parse_classification(r#"{"classification": "newsletter", "confidence": 0.92}"#).unwrap();
        assert_eq!(parsed, Classification::new("NEWSLETTER", 0.92));
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = parse_classification("{}").unwrap();
        assert_eq!(parsed, Classification::new("IMPORTANT", 0.0));

        let parsed = parse_classification(r#"{"classification": "PROMOTION"}"#).unwrap();
        assert_eq!(parsed, Classification::new("PROMOTION", 0.0));
    }

    #[test]
    fn test_parse_string_confidence() {
        let parsed = parse_classification(r#"{"classification": "COURSE", "confidence": "0.7"}"#).unwrap();
        assert_eq!(parsed.confidence, 0.7);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let parsed = parse_classification(r#"{"classification": "OUTREACH", "confidence": 7}"#).unwrap();
        assert_eq!(parsed.confidence, 1.0);

        let parsed = parse_classification(r#"{"classification": "OUTREACH", "confidence": -0.2}"#).unwrap();
        assert_eq!(parsed.confidence, 0.0);
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let reply = "Sure! Here you go:\n{\"classification\": \"PROMOTION\", \"confidence\": 0.81}\nThanks";
        let parsed = parse_classification(reply).unwrap();
        assert_eq!(parsed, Classification::new("PROMOTION", 0.81));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_classification("not json at all").is_err());
        assert!(parse_classification("[1, 2, 3]").is_err());
        assert!(parse_classification(r#"{"confidence": "high"}"#).is_err());
        assert!(parse_classification(r#"{"confidence": [0.5]}"#).is_err());
    }
}
