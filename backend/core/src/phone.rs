//! Phone number parsing and normalization.
//!
//! Recognizes North American numbers (`+1` / `1` prefixed or bare 10 digits)
//! and treats any other `+`-prefixed string of at least 8 characters as an
//! international number. The line-type classification is a coarse area-code
//! heuristic; swap in a library-backed [`PhoneValidator`] where accuracy matters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `+1AAALLLLLLL`, `1AAALLLLLLL`, or `AAALLLLLLL` after cleaning.
static US_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\+1|1)?(\d{3})(\d{3})(\d{4})$").unwrap());

/// Minimum cleaned length for a generic international number, `+` included.
const MIN_INTERNATIONAL_LEN: usize = 8;

/// Area codes treated as mobile-heavy.
const MOBILE_AREA_CODES: &[&str] = &[
    "212", "213", "310", "323", "347", "415", "424", "628", "646", "718", "818", "917",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Mobile,
    Landline,
    International,
    #[default]
    Unknown,
}

/// A parsed phone number. Invalid input still yields a value with `is_valid = false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhoneNumber {
    /// Input exactly as given.
    pub raw: String,
    /// Digits plus an optional leading `+`.
    pub digits: String,
    pub country_code: String,
    pub area_code: String,
    pub local_number: String,
    pub formatted: String,
    pub is_valid: bool,
    pub line_type: LineType,
    pub carrier: Option<String>,
}

impl PhoneNumber {
    fn invalid(raw: &str, digits: String) -> Self {
        Self {
            raw: raw.to_string(),
            digits,
            country_code: String::new(),
            area_code: String::new(),
            local_number: String::new(),
            formatted: raw.to_string(),
            is_valid: false,
            line_type: LineType::Unknown,
            carrier: None,
        }
    }

    /// E.164 dial string, or `None` for an invalid number.
    pub fn dial_string(&self) -> Option<String> {
        if !self.is_valid {
            return None;
        }
        if self.area_code.is_empty() {
            return Some(self.digits.clone());
        }
        Some(format!(
            "{}{}{}",
            self.country_code, self.area_code, self.local_number
        ))
    }
}

/// Parses user-entered phone numbers.
pub trait PhoneValidator: Send + Sync {
    fn parse(&self, raw: &str) -> PhoneNumber;

    /// Canonical dial string, or the input unchanged when it does not parse.
    fn format_for_dialing(&self, raw: &str) -> String {
        self.parse(raw)
            .dial_string()
            .unwrap_or_else(|| raw.to_string())
    }

    fn is_valid(&self, raw: &str) -> bool {
        self.parse(raw).is_valid
    }
}

/// Built-in heuristic validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneNumberValidator;

impl PhoneNumberValidator {
    pub fn new() -> Self {
        Self
    }

    fn clean(raw: &str) -> String {
        let trimmed = raw.trim();
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if trimmed.starts_with('+') {
            format!("+{}", digits)
        } else {
            digits
        }
    }

    fn classify_us(area_code: &str) -> LineType {
        if MOBILE_AREA_CODES.contains(&area_code) {
            LineType::Mobile
        } else {
            LineType::Landline
        }
    }
}

impl PhoneValidator for PhoneNumberValidator {
    fn parse(&self, raw: &str) -> PhoneNumber {
        let cleaned = Self::clean(raw);

        if let Some(caps) = US_NUMBER.captures(&cleaned) {
            let area = &caps[1];
            let exchange = &caps[2];
            let line = &caps[3];
            return PhoneNumber {
                raw: raw.to_string(),
                digits: cleaned.clone(),
                country_code: "+1".to_string(),
                area_code: area.to_string(),
                local_number: format!("{}{}", exchange, line),
                formatted: format!("+1 ({}) {}-{}", area, exchange, line),
                is_valid: true,
                line_type: Self::classify_us(area),
                carrier: None,
            };
        }

        if cleaned.starts_with('+') && cleaned.len() >= MIN_INTERNATIONAL_LEN {
            return PhoneNumber {
                raw: raw.to_string(),
                digits: cleaned.clone(),
                country_code: String::new(),
                area_code: String::new(),
                local_number: String::new(),
                formatted: cleaned,
                is_valid: true,
                line_type: LineType::International,
                carrier: None,
            };
        }

        PhoneNumber::invalid(raw, cleaned)
    }
}
