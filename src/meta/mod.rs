//! Hive metadata model.
//!
//! The metadata graph describes how a hive is partitioned:
//!
//! ```text
//! Hive
//!  └── PartitionDimension  (a partitioning axis, e.g. "user")
//!       ├── Resource       (an entity class, e.g. "weather")
//!       │    └── SecondaryIndex  (an attribute index, e.g. "city")
//!       └── Node           (a physical shard)
//! ```
//!
//! Plus two status records: [`KeySemaphore`] (per partition key, persisted
//! in the directory) and [`HiveSemaphore`] (the hive-wide revision and
//! read-only flag).

pub mod types;

pub use types::{
    HiveSemaphore, KeySemaphore, Node, PartitionDimension, Resource, SecondaryIndex,
};

use crate::error::ValidationError;

/// Maximum length of an entity name in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Validates a metadata entity name.
///
/// # Rules
/// - Not empty or whitespace-only
/// - At most [`MAX_NAME_LENGTH`] characters
///
/// Names become part of directory table names, so they are also restricted
/// to alphanumerics, `-` and `_`.
pub(crate) fn validate_entity_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::required_field(field));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::invalid_field(
            field,
            format!("must be at most {} characters", MAX_NAME_LENGTH),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_field(
            field,
            "must contain only alphanumerics, '-' and '_'",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entity_name_accepts_normal_names() {
        assert!(validate_entity_name("name", "user").is_ok());
        assert!(validate_entity_name("name", "weather_station-2").is_ok());
    }

    #[test]
    fn test_validate_entity_name_rejects_empty() {
        assert!(validate_entity_name("name", "").is_err());
        assert!(validate_entity_name("name", "   ").is_err());
    }

    #[test]
    fn test_validate_entity_name_rejects_too_long() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_entity_name("name", &long).is_err());
    }

    #[test]
    fn test_validate_entity_name_rejects_separators() {
        assert!(validate_entity_name("name", "a b").is_err());
        assert!(validate_entity_name("name", "a.b").is_err());
        assert!(validate_entity_name("name", "a/b").is_err());
    }
}
