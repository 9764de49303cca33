//! Field-scoped validation primitives.
//!
//! Validation never reaches the store. Each failure is reported as a [`FieldError`] keyed by
//! the form path of the offending input (`firstName`, `addresses.0.zip`,
//! `customFieldValues.<fieldId>`) so a form can render the message next to the field.

use crate::constants::ZIP_PATTERN;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single field-scoped validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FieldError {
    /// Form path of the offending field.
    pub field: String,
    /// Human-readable message shown next to the field.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Form path of an address sub-field, e.g. `addresses.0.zip`.
pub fn address_path(index: usize, field: &str) -> String {
    format!("addresses.{index}.{field}")
}

/// Form path of a custom field value, e.g. `customFieldValues.abc123`.
pub fn custom_field_path(field_id: &str) -> String {
    format!("customFieldValues.{field_id}")
}

fn zip_regex() -> &'static Regex {
    static ZIP: OnceLock<Regex> = OnceLock::new();
    ZIP.get_or_init(|| Regex::new(ZIP_PATTERN).expect("zip pattern is a valid regex"))
}

/// Returns true if `zip` is a five digit zip code, optionally followed by `-` and four digits.
pub fn is_valid_zip(zip: &str) -> bool {
    zip_regex().is_match(zip)
}

/// Returns true if `value` is an ISO calendar date written exactly as `YYYY-MM-DD`.
///
/// chrono accepts unpadded fields, short years and a leading sign, so the shape is checked
/// before the calendar.
pub fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    shaped && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Returns true if the value is missing or blank.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Pushes a "`label` is required" error when `value` is blank.
///
/// Returns true if the value was present.
pub(crate) fn require(
    errors: &mut Vec<FieldError>,
    field: impl Into<String>,
    label: &str,
    value: &str,
) -> bool {
    if is_blank(value) {
        errors.push(FieldError::new(field, format!("{label} is required")));
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_accepts_five_and_nine_digit_forms() {
        assert!(is_valid_zip("62704"));
        assert!(is_valid_zip("62704-1234"));
    }

    #[test]
    fn test_zip_rejects_malformed_values() {
        for bad in ["1234", "123456", "62704-123", "62704-12345", "6270a", " 62704", "62704 ", "", "62704_1234"] {
            assert!(!is_valid_zip(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_zip_rejects_non_ascii_digits() {
        // fullwidth, Arabic-Indic and Devanagari digits
        for bad in [
            "\u{FF16}\u{FF12}\u{FF17}\u{FF10}\u{FF14}",
            "\u{0666}\u{0662}\u{0667}\u{0660}\u{0664}",
            "62704-\u{0967}\u{0968}\u{0969}\u{096A}",
        ] {
            assert!(!is_valid_zip(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_is_iso_date() {
        assert!(is_iso_date("1990-01-01"));
        assert!(is_iso_date("2024-02-29"));
        assert!(!is_iso_date("2023-02-29"));
        assert!(!is_iso_date("01/01/1990"));
        assert!(!is_iso_date(""));
    }

    #[test]
    fn test_is_iso_date_rejects_loose_forms() {
        for bad in ["1990-1-1", "1990-01-1", "90-01-01", "+1990-01-01", " 1990-01-01", "1990/01/01", "\u{FF11}990-01-01"] {
            assert!(!is_iso_date(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_require_pushes_error_for_blank() {
        let mut errors = Vec::new();
        assert!(!require(&mut errors, "city", "City", "  "));
        assert!(require(&mut errors, "state", "State", "IL"));
        assert_eq!(errors, vec![FieldError::new("city", "City is required")]);
    }

    #[test]
    fn test_paths() {
        assert_eq!(address_path(2, "zip"), "addresses.2.zip");
        assert_eq!(custom_field_path("f1"), "customFieldValues.f1");
    }
}
