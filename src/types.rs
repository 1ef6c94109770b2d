//! Core type definitions for HiveDir identifiers, statuses, and partition keys.
//!
//! Metadata entities use small integer ids assigned by the persistence
//! gateways. An id of 0 ([`UNSAVED_ID`]) marks an entity that has not been
//! persisted yet; gateways overwrite it on create and reject it everywhere
//! else.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sentinel id value for entities that have not been persisted yet.
pub const UNSAVED_ID: u32 = 0;

/// Partition dimension identifier.
///
/// Assigned by the dimension gateway on create. A freshly constructed
/// dimension carries [`DimensionId::UNSAVED`] until persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionId(pub u32);

impl DimensionId {
    /// The not-yet-persisted sentinel.
    pub const UNSAVED: Self = Self(UNSAVED_ID);

    /// Returns true if this id has not been assigned by a gateway.
    #[inline]
    pub const fn is_unsaved(&self) -> bool {
        self.0 == UNSAVED_ID
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// The not-yet-persisted sentinel.
    pub const UNSAVED: Self = Self(UNSAVED_ID);

    /// Returns true if this id has not been assigned by a gateway.
    #[inline]
    pub const fn is_unsaved(&self) -> bool {
        self.0 == UNSAVED_ID
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secondary index identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecondaryIndexId(pub u32);

impl SecondaryIndexId {
    /// The not-yet-persisted sentinel.
    pub const UNSAVED: Self = Self(UNSAVED_ID);

    /// Returns true if this id has not been assigned by a gateway.
    #[inline]
    pub const fn is_unsaved(&self) -> bool {
        self.0 == UNSAVED_ID
    }
}

impl fmt::Display for SecondaryIndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data node identifier.
///
/// Node ids appear both in the metadata graph and in persisted directory
/// rows ([`crate::meta::KeySemaphore`]), so they must stay stable for the
/// lifetime of the hive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The not-yet-persisted sentinel.
    pub const UNSAVED: Self = Self(UNSAVED_ID);

    /// Returns true if this id has not been assigned by a gateway.
    #[inline]
    pub const fn is_unsaved(&self) -> bool {
        self.0 == UNSAVED_ID
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Writability status of the hive, a node, or a partition key.
///
/// All three lock scopes share this flat two-state machine. The effective
/// writability of an operation is the AND across the scopes it touches
/// (see [`crate::lock`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Writes are accepted.
    #[default]
    Writable,
    /// Writes are refused; reads proceed.
    ReadOnly,
}

impl Status {
    /// Returns true if this status accepts writes.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::Writable)
    }

    /// Constructs a status from a persisted read-only flag.
    #[inline]
    pub const fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::ReadOnly
        } else {
            Self::Writable
        }
    }

    /// Returns the persisted read-only flag for this status.
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writable => write!(f, "writable"),
            Self::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Intent declared when acquiring a connection to a data node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read-only access; permitted regardless of lock state.
    Read,
    /// Read-write access; refused when any lock scope is read-only.
    ReadWrite,
}

impl Access {
    /// Returns true for [`Access::ReadWrite`].
    #[inline]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Type of a partition key or secondary index column.
///
/// Declared on dimensions, resources, and secondary indexes; values flowing
/// through the directory are checked against it before touching storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// 64-bit signed integer keys.
    Integer,
    /// UTF-8 string keys.
    Text,
    /// UUID keys.
    Uuid,
}

impl KeyType {
    /// Returns true if `value` is of this type.
    #[inline]
    pub fn accepts(&self, value: &KeyValue) -> bool {
        *self == value.key_type()
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Text => write!(f, "text"),
            Self::Uuid => write!(f, "uuid"),
        }
    }
}

// Canonical encoding tags. Stored in directory tables, so the values are
// part of the on-disk format and must never be reused.
const TAG_INTEGER: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_UUID: u8 = 3;

/// A partition key, resource id, or secondary index key value.
///
/// Key values are stored in directory tables in a canonical byte encoding
/// (see [`KeyValue::to_canonical_bytes`]) so equality at the storage layer
/// matches equality here.
///
/// # Example
/// ```
/// use hivedir::KeyValue;
///
/// let key = KeyValue::from(42i64);
/// let restored = KeyValue::from_canonical_bytes(&key.to_canonical_bytes()).unwrap();
/// assert_eq!(key, restored);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// 64-bit signed integer key.
    Integer(i64),
    /// UTF-8 string key.
    Text(String),
    /// UUID key.
    Uuid(Uuid),
}

impl KeyValue {
    /// Returns the [`KeyType`] of this value.
    #[inline]
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Integer(_) => KeyType::Integer,
            Self::Text(_) => KeyType::Text,
            Self::Uuid(_) => KeyType::Uuid,
        }
    }

    /// Encodes this value into its canonical storage bytes.
    ///
    /// Format: one type tag byte followed by the payload (big-endian i64,
    /// raw UTF-8, or the 16 UUID bytes). The encoding is injective, so byte
    /// equality in directory tables is value equality.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::Integer(v) => {
                let mut bytes = Vec::with_capacity(9);
                bytes.push(TAG_INTEGER);
                bytes.extend_from_slice(&v.to_be_bytes());
                bytes
            }
            Self::Text(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len());
                bytes.push(TAG_TEXT);
                bytes.extend_from_slice(s.as_bytes());
                bytes
            }
            Self::Uuid(u) => {
                let mut bytes = Vec::with_capacity(17);
                bytes.push(TAG_UUID);
                bytes.extend_from_slice(u.as_bytes());
                bytes
            }
        }
    }

    /// Decodes a value from its canonical storage bytes.
    ///
    /// Returns `None` if the bytes are not a valid encoding. Directory rows
    /// are only ever written through [`KeyValue::to_canonical_bytes`], so a
    /// decode failure indicates a corrupted table.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Option<Self> {
        let (&tag, payload) = bytes.split_first()?;
        match tag {
            TAG_INTEGER => {
                let raw: [u8; 8] = payload.try_into().ok()?;
                Some(Self::Integer(i64::from_be_bytes(raw)))
            }
            TAG_TEXT => Some(Self::Text(String::from_utf8(payload.to_vec()).ok()?)),
            TAG_UUID => {
                let raw: [u8; 16] = payload.try_into().ok()?;
                Some(Self::Uuid(Uuid::from_bytes(raw)))
            }
            _ => None,
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
            Self::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// Unix timestamp in milliseconds.
///
/// Recorded in the `last_updated` column of every directory row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch, returns the epoch
    /// rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_sentinels() {
        assert!(DimensionId::UNSAVED.is_unsaved());
        assert!(ResourceId::UNSAVED.is_unsaved());
        assert!(SecondaryIndexId::UNSAVED.is_unsaved());
        assert!(NodeId::UNSAVED.is_unsaved());
        assert!(!NodeId(7).is_unsaved());
    }

    #[test]
    fn test_status_from_read_only() {
        assert_eq!(Status::from_read_only(true), Status::ReadOnly);
        assert_eq!(Status::from_read_only(false), Status::Writable);
        assert!(Status::Writable.is_writable());
        assert!(Status::ReadOnly.is_read_only());
    }

    #[test]
    fn test_key_type_accepts() {
        assert!(KeyType::Integer.accepts(&KeyValue::from(1i64)));
        assert!(KeyType::Text.accepts(&KeyValue::from("a")));
        assert!(!KeyType::Integer.accepts(&KeyValue::from("a")));
    }

    #[test]
    fn test_key_value_canonical_roundtrip() {
        let values = [
            KeyValue::Integer(-42),
            KeyValue::Integer(i64::MAX),
            KeyValue::Text(String::new()),
            KeyValue::Text("New York".to_string()),
            KeyValue::Uuid(Uuid::new_v4()),
        ];
        for value in values {
            let bytes = value.to_canonical_bytes();
            assert_eq!(KeyValue::from_canonical_bytes(&bytes), Some(value));
        }
    }

    #[test]
    fn test_key_value_canonical_is_injective() {
        let a = KeyValue::Integer(1).to_canonical_bytes();
        let b = KeyValue::Text("\u{1}".to_string()).to_canonical_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_value_rejects_garbage() {
        assert_eq!(KeyValue::from_canonical_bytes(&[]), None);
        assert_eq!(KeyValue::from_canonical_bytes(&[99, 1, 2]), None);
        // Integer payload must be exactly 8 bytes
        assert_eq!(KeyValue::from_canonical_bytes(&[1, 0, 0]), None);
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(2000);
        assert!(t1 < t2);
    }

    #[test]
    fn test_id_serialization() {
        let id = NodeId(17);
        let bytes = bincode::serialize(&id).unwrap();
        let restored: NodeId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, restored);
    }
}
