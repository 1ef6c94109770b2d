//! Error types for HiveDir.
//!
//! HiveDir uses a hierarchical error system:
//! - [`HiveError`] is the top-level error returned by all public APIs
//! - Specific error types ([`StorageError`], [`ValidationError`],
//!   [`NotFoundError`]) provide detail
//!
//! Gateway errors bubble up unchanged; the hive facade wraps them with the
//! names of the entities involved. Lock refusals ([`HiveError::ReadOnly`])
//! are terminal for the caller and are never retried internally.

use thiserror::Error;

use crate::lock::LockScope;
use crate::types::KeyType;

/// Result type alias for HiveDir operations.
pub type Result<T> = std::result::Result<T, HiveError>;

/// Top-level error enum for all HiveDir operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum HiveError {
    /// Storage layer error (I/O, corruption, transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Requested entity or key absent.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A sibling entity with the same name already exists.
    #[error("Duplicate name: {kind} '{name}' already exists in {scope}")]
    DuplicateName {
        /// Entity kind, e.g. `"resource"`.
        kind: &'static str,
        /// The conflicting name.
        name: String,
        /// The enclosing scope (hive, dimension, or resource name).
        scope: String,
    },

    /// The primary index already holds a row for this key.
    #[error("Duplicate key: partition key {0} already exists")]
    DuplicateKey(String),

    /// A directory insert referenced a parent row that does not exist.
    #[error("Missing parent: {0}")]
    MissingParent(String),

    /// The lock engine refused a write.
    #[error("Read-only {scope}: {reason}")]
    ReadOnly {
        /// Which lock scope refused the operation.
        scope: LockScope,
        /// Human-readable description of the refused target.
        reason: String,
    },

    /// The assigner was given no writable node to choose from.
    #[error("No writable node available for key {0}")]
    NoWritableNode(String),

    /// The hive metadata schema is not installed at the given URI.
    #[error("Hive metadata not installed at '{0}'")]
    MetadataMissing(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HiveError {
    /// Creates a duplicate-name error.
    pub fn duplicate_name(
        kind: &'static str,
        name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Creates a read-only refusal for the given scope.
    pub fn read_only(scope: LockScope, reason: impl Into<String>) -> Self {
        Self::ReadOnly {
            scope,
            reason: reason.into(),
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a duplicate name or duplicate key error.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateName { .. } | Self::DuplicateKey(_))
    }

    /// Returns true if the lock engine refused the operation.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly { .. })
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer and
/// carry the driver message unchanged.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("Database corrupted: {0}")]
    Corrupted(String),

    /// Database is locked by another process.
    #[error("Database is locked by another writer")]
    DatabaseLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Engine(String),

    /// A gateway received an entity with the unsaved (0) id sentinel.
    #[error("Cannot {operation} {entity} with unsaved id")]
    UnsavedId {
        /// Entity kind, e.g. `"node"`.
        entity: &'static str,
        /// The rejected operation, e.g. `"update"`.
        operation: &'static str,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an engine error with the given message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates an unsaved-id error for a gateway operation.
    pub fn unsaved_id(entity: &'static str, operation: &'static str) -> Self {
        Self::UnsavedId { entity, operation }
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Engine(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Engine(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Engine(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Engine(format!("Storage error: {}", err))
    }
}

// Convert bincode errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to HiveError for convenience
impl From<redb::Error> for HiveError {
    fn from(err: redb::Error) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for HiveError {
    fn from(err: redb::DatabaseError) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for HiveError {
    fn from(err: redb::TransactionError) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for HiveError {
    fn from(err: redb::CommitError) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for HiveError {
    fn from(err: redb::TableError) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for HiveError {
    fn from(err: redb::StorageError) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for HiveError {
    fn from(err: bincode::Error) -> Self {
        HiveError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// A key value does not match the declared key type.
    #[error("Key type mismatch: expected {expected}, got {got}")]
    KeyTypeMismatch {
        /// The type declared on the dimension, resource, or index.
        expected: KeyType,
        /// The type of the supplied value.
        got: KeyType,
    },
}

impl ValidationError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a key type mismatch error.
    pub fn key_type_mismatch(expected: KeyType, got: KeyType) -> Self {
        Self::KeyTypeMismatch { expected, got }
    }
}

/// Not found errors for specific entity and key kinds.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Partition dimension with the given name not found.
    #[error("Partition dimension not found: {0}")]
    Dimension(String),

    /// Resource with the given name not found in its dimension.
    #[error("Resource not found: {0}")]
    Resource(String),

    /// Secondary index with the given name not found on its resource.
    #[error("Secondary index not found: {0}")]
    SecondaryIndex(String),

    /// Node with the given name or id not found in its dimension.
    #[error("Node not found: {0}")]
    Node(String),

    /// Partition key has no primary index row.
    #[error("Partition key not found: {0}")]
    PrimaryKey(String),

    /// Resource id has no resource index row.
    #[error("Resource id not found: {0}")]
    ResourceId(String),

    /// Secondary key has no secondary index row.
    #[error("Secondary index key not found: {0}")]
    SecondaryKey(String),
}

impl NotFoundError {
    /// Creates a dimension not found error.
    pub fn dimension(name: impl ToString) -> Self {
        Self::Dimension(name.to_string())
    }

    /// Creates a resource not found error.
    pub fn resource(name: impl ToString) -> Self {
        Self::Resource(name.to_string())
    }

    /// Creates a secondary index not found error.
    pub fn secondary_index(name: impl ToString) -> Self {
        Self::SecondaryIndex(name.to_string())
    }

    /// Creates a node not found error.
    pub fn node(name: impl ToString) -> Self {
        Self::Node(name.to_string())
    }

    /// Creates a primary key not found error.
    pub fn primary_key(key: impl ToString) -> Self {
        Self::PrimaryKey(key.to_string())
    }

    /// Creates a resource id not found error.
    pub fn resource_id(id: impl ToString) -> Self {
        Self::ResourceId(id.to_string())
    }

    /// Creates a secondary key not found error.
    pub fn secondary_key(key: impl ToString) -> Self {
        Self::SecondaryKey(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HiveError::duplicate_name("resource", "weather", "user");
        assert_eq!(
            err.to_string(),
            "Duplicate name: resource 'weather' already exists in user"
        );
    }

    #[test]
    fn test_read_only_display() {
        let err = HiveError::read_only(LockScope::Hive, "hive is read-only");
        assert_eq!(err.to_string(), "Read-only hive: hive is read-only");
        assert!(err.is_read_only());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::unsaved_id("node", "update");
        assert_eq!(err.to_string(), "Cannot update node with unsaved id");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::key_type_mismatch(KeyType::Integer, KeyType::Text);
        assert_eq!(
            err.to_string(),
            "Key type mismatch: expected integer, got text"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = NotFoundError::dimension("user");
        assert_eq!(err.to_string(), "Partition dimension not found: user");
    }

    #[test]
    fn test_is_not_found() {
        let err: HiveError = NotFoundError::primary_key(42).into();
        assert!(err.is_not_found());
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_is_duplicate() {
        let err = HiveError::DuplicateKey("42".to_string());
        assert!(err.is_duplicate());
        assert!(!err.is_read_only());
    }

    #[test]
    fn test_error_conversion_chain() {
        // Simulate a storage error propagating up
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }
}
