//! Sender address helpers.
//!
//! Mail providers hand us raw `From` header values such as
//! `Weekly Digest <news@marketing.com>`. The engine keys everything on the
//! bare address, so extraction lives here next to the domain helpers that
//! the safety filter and the reputation store share.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Address inside angle brackets: `Name <user@host>`
    static ref ANGLE_ADDRESS_PATTERN: Regex = Regex::new(r"<\s*([^<>\s]+)\s*>").unwrap();

    /// Email address pattern (RFC 5322 simplified)
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();
}

/// Extract the bare address from a `From` header value.
///
/// Case is preserved: addresses are lookup keys exactly as received. When no
/// address can be found the trimmed header value is returned unchanged, which
/// the safety filter then treats as a malformed sender.
pub fn extract_email_address(from_header: &str) -> String {
    let trimmed = from_header.trim();

    if let Some(caps) = ANGLE_ADDRESS_PATTERN.captures(trimmed) {
        return caps[1].to_string();
    }

    if let Some(m) = EMAIL_PATTERN.find(trimmed) {
        return m.as_str().to_string();
    }

    trimmed.to_string()
}

/// The raw part after the last `@`, if the address has one.
pub fn domain_part(address: &str) -> Option<&str> {
    address.rsplit_once('@').map(|(_, domain)| domain)
}

/// Lower-cased domain used for records and matching.
///
/// Addresses without an `@` yield the whole value lower-cased.
pub fn normalized_domain(address: &str) -> String {
    domain_part(address).unwrap_or(address).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_display_name() {
        assert_eq!(
            extract_email_address("Newsletter <news@marketing.com>"),
            "news@marketing.com"
        );
        assert_eq!(
            extract_email_address("\"Doe, John\" < John.Doe@Company.com >"),
            "John.Doe@Company.com"
        );
    }

    #[test]
    fn test_extract_bare_address() {
        assert_eq!(extract_email_address("  promo@shop.com "), "promo@shop.com");
    }

    #[test]
    fn test_extract_without_address_returns_input() {
        assert_eq!(extract_email_address("Unknown"), "Unknown");
        assert_eq!(extract_email_address(""), "");
    }

    #[test]
    fn test_domain_helpers() {
        assert_eq!(domain_part("news@Marketing.COM"), Some("Marketing.COM"));
        assert_eq!(domain_part("no-at-sign"), None);
        assert_eq!(normalized_domain("news@Marketing.COM"), "marketing.com");
        assert_eq!(normalized_domain("weird@odd@Host.org"), "host.org");
        assert_eq!(normalized_domain("NoAt"), "noat");
    }
}
