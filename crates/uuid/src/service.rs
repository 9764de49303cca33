//! Internal implementation of identifier services.

use crate::{IdError, IdResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::{fmt, str::FromStr};

/// Length of a generated auto-id.
pub const AUTO_ID_LEN: usize = 20;

/// Upper bound on accepted document id length.
pub const MAX_ID_LEN: usize = 128;

/// A validated store document identifier.
///
/// Once constructed the id is guaranteed to be 1..=[`MAX_ID_LEN`] characters drawn from
/// `A-Z`, `a-z`, `0-9`, `-` and `_`. That makes it safe to embed in a REST path segment and
/// to use as a file name.
///
/// # Construction
/// - [`DocumentId::generate`] allocates a fresh auto-id for an insert.
/// - [`DocumentId::parse`] validates an externally supplied identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generates a new random auto-id of [`AUTO_ID_LEN`] alphanumeric characters.
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTO_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Validates and wraps an externally supplied document id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] if `input` is empty, too long, or contains a
    /// character outside the accepted alphabet.
    pub fn parse(input: &str) -> IdResult<Self> {
        if Self::is_valid(input) {
            return Ok(Self(input.to_string()));
        }
        Err(IdError::InvalidInput(format!(
            "document id must be 1-{} characters of [A-Za-z0-9_-], got: '{}'",
            MAX_ID_LEN, input
        )))
    }

    /// Returns true if `input` would be accepted by [`DocumentId::parse`].
    pub fn is_valid(input: &str) -> bool {
        !input.is_empty()
            && input.len() <= MAX_ID_LEN
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentId::parse(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DocumentId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Allocates a fresh address row id (hyphenated UUID v4).
pub fn new_address_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_valid_auto_id() {
        let id = DocumentId::generate();

        assert_eq!(id.as_str().len(), AUTO_ID_LEN);
        assert!(DocumentId::is_valid(id.as_str()));
        assert!(id.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_is_unique() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_accepts_store_style_ids() {
        for ok in ["AbC123xyz09876543210", "patient_1", "x-y-z", "7"] {
            let id = DocumentId::parse(ok).expect("parse should succeed");
            assert_eq!(id.to_string(), ok);
        }
    }

    #[test]
    fn test_parse_rejects_path_traversal() {
        let result = DocumentId::parse("../etc/passwd");

        match result {
            Err(IdError::InvalidInput(msg)) => assert!(msg.contains("[A-Za-z0-9_-]")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_too_long() {
        assert!(DocumentId::parse("").is_err());
        assert!(DocumentId::parse(&"a".repeat(MAX_ID_LEN + 1)).is_err());
        assert!(DocumentId::parse(&"a".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn test_parse_rejects_separators_and_whitespace() {
        for bad in ["a/b", "a b", "a.b", "a\\b", "ab\n"] {
            assert!(DocumentId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_from_str_matches_parse() {
        let id: DocumentId = "abc".parse().expect("from_str should succeed");
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_new_address_id_is_hyphenated_uuid() {
        let id = new_address_id();
        assert_eq!(id.len(), 36);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_ne!(id, new_address_id());
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let id: DocumentId = serde_json::from_str("\"abc_123\"").expect("deserialize should succeed");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc_123\"");

        let bad: Result<DocumentId, _> = serde_json::from_str("\"a/b\"");
        assert!(bad.is_err());
    }
}
