//! Utility functions for identity handling.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Parse device name from user agent string.
///
/// # Examples
///
/// ```
/// use travio_identity::utils::parse_device_name;
///
/// assert_eq!(parse_device_name("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"), "Mobile Browser");
/// assert_eq!(parse_device_name("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"), "Tablet Browser");
/// assert_eq!(parse_device_name("travio-ios/3.2"), "Travio App");
/// assert_eq!(parse_device_name(""), "Unknown Device");
/// ```
#[must_use]
pub fn parse_device_name(user_agent: &str) -> String {
    let ua = user_agent.to_lowercase();

    let name = if ua.trim().is_empty() {
        "Unknown Device"
    } else if ua.starts_with("travio-") {
        "Travio App"
    } else if ua.contains("ipad") || ua.contains("tablet") {
        "Tablet Browser"
    } else if ua.contains("iphone") || ua.contains("android") {
        "Mobile Browser"
    } else {
        "Web Browser"
    };
    name.to_string()
}

/// Trim and lower-case an email for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email address format.
///
/// Basic shape check: one `@`, non-empty local part, dotted domain with
/// non-empty labels, length between 3 and 255.
///
/// # Examples
///
/// ```
/// use travio_identity::utils::is_valid_email;
///
/// assert!(is_valid_email("user@example.com"));
/// assert!(is_valid_email("user+tag@subdomain.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("user@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-'));

    local_ok && domain_ok && domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

/// One-way hash of an issued token string for server-side storage.
///
/// SHA-256, base64url without padding.
#[must_use]
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names() {
        assert_eq!(parse_device_name("Mozilla/5.0 (Linux; Android 13)"), "Mobile Browser");
        assert_eq!(parse_device_name("Mozilla/5.0 (Linux; Android 13; Tablet)"), "Tablet Browser");
        assert_eq!(parse_device_name("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"), "Web Browser");
    }

    #[test]
    fn valid_emails() {
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user_name@example.co.uk"));
    }

    #[test]
    fn invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user@example."));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("user name@example.com"));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn token_hash_is_stable_and_unpadded() {
        let hash = hash_token("abc");
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
        assert_eq!(hash.len(), 43);
        assert!(!hash.contains('='));
    }
}
