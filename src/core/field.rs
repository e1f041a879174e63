//! Field formats and normalization helpers for request payloads

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Field format validators
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Phone,
    /// Calendar date as `YYYY-MM-DD`
    Date,
}

impl FieldFormat {
    /// Validate a string against this format
    pub fn validate(&self, value: &str) -> bool {
        match self {
            FieldFormat::Email => Self::is_valid_email(value),
            FieldFormat::Phone => Self::is_valid_phone(value),
            FieldFormat::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        }
    }

    fn is_valid_email(email: &str) -> bool {
        static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = EMAIL_REGEX.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
                .expect("email pattern is valid")
        });
        regex.is_match(email)
    }

    fn is_valid_phone(phone: &str) -> bool {
        static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = PHONE_REGEX.get_or_init(|| {
            // 8 to 15 digits (E.164), separators already stripped
            Regex::new(r"^\+?\d{8,15}$").expect("phone pattern is valid")
        });
        let compact: String = phone
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
            .collect();
        regex.is_match(&compact)
    }
}

/// Trimmed text, `None` when absent or blank
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse an optional id field; blank means absent
///
/// Returns `Err` with the offending text when it is not a UUID.
pub fn optional_uuid(value: Option<&str>) -> Result<Option<Uuid>, String> {
    match non_blank(value) {
        None => Ok(None),
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| text),
    }
}
