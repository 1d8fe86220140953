//! Log Redaction Layer
//!
//! Scrubs customer phone numbers, API keys, and bearer tokens from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static E164_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+\d{8,15}\b").unwrap());
static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = E164_RE.replace_all(input, "[REDACTED_PHONE]");
    let redacted = TELEPHONE_RE.replace_all(&redacted, "[REDACTED_PHONE]");
    API_KEY_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .into_owned()
}

/// Keep only the last four digits of a phone number, e.g. `***4567`.
pub fn mask_phone(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("***{}", tail)
}
