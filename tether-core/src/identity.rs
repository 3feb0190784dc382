//! Identity types for Tether entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{TetherError, ValidationError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Optimistic concurrency token carried by every mutable row.
pub type Version = u64;

/// Entity identifier for content items (restrictions, restraint sets, moodles).
pub type EntityId = Uuid;

/// Maximum length of a [`Uid`].
pub const UID_MAX_LEN: usize = 32;

/// Length of identifiers produced by [`Uid::generate`].
pub const GENERATED_UID_LEN: usize = 10;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

// ============================================================================
// UID
// ============================================================================

/// Short unique account identifier, e.g. `AB12345678`.
///
/// Always 1..=32 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Parse and validate a uid.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "uid".to_string(),
            });
        }
        if raw.len() > UID_MAX_LEN {
            return Err(ValidationError::InvalidValue {
                field: "uid".to_string(),
                reason: format!("longer than {} characters", UID_MAX_LEN),
            });
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidValue {
                field: "uid".to_string(),
                reason: "must be ASCII alphanumeric".to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Derive a fresh 10-character upper-case uid from a random UUID.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(simple[..GENERATED_UID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uid {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s)?)
    }
}

impl TryFrom<String> for Uid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// VERSIONED ROWS
// ============================================================================

/// A stored row together with its compare-and-swap version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: Version,
    pub data: T,
}

impl<T> Versioned<T> {
    /// Wrap a freshly inserted row (first version is 1).
    pub fn initial(data: T) -> Self {
        Self { version: 1, data }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            version: self.version,
            data: f(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_parse_accepts_alphanumeric() {
        let uid = Uid::parse("AB12345678").unwrap();
        assert_eq!(uid.as_str(), "AB12345678");
        assert_eq!(uid.to_string(), "AB12345678");
    }

    #[test]
    fn test_uid_parse_rejects_bad_input() {
        assert!(matches!(
            Uid::parse(""),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(Uid::parse("has space").is_err());
        assert!(Uid::parse(&"A".repeat(UID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_uid_generate_shape() {
        let uid = Uid::generate();
        assert_eq!(uid.as_str().len(), GENERATED_UID_LEN);
        assert!(uid
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_uid_serde_validates() {
        let ok: Uid = serde_json::from_str("\"ZZ99999999\"").unwrap();
        assert_eq!(ok.as_str(), "ZZ99999999");
        assert!(serde_json::from_str::<Uid>("\"not valid!\"").is_err());
    }
}
