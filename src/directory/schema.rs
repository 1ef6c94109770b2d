//! Directory database schema.
//!
//! Each dimension owns three families of key-routing tables in its
//! directory database. Table names are built at runtime and prefixed with
//! the dimension name so several dimensions can share one database file:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ {dim}_primary_index                       (multimap)          │
//! │   Key: &[u8]  canonical partition key                         │
//! │   Value: &[u8] bincode PrimaryIndexEntry                      │
//! │   One value per node the key lives on.                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ {dim}_resource_index_{resource}                               │
//! │   Key: &[u8]  canonical resource id                           │
//! │   Value: &[u8] bincode ResourceIndexEntry                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ {dim}_secondary_index_{resource}_{index}  (multimap)          │
//! │   Key: &[u8]  canonical secondary key                         │
//! │   Value: &[u8] bincode SecondaryIndexEntry                    │
//! │   One value per resource id the secondary key points at.      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are canonical [`KeyValue`](crate::KeyValue) bytes, so byte equality
//! is value equality. Entity names are validated to table-name-safe
//! characters before they reach this module.

use redb::{MultimapTableDefinition, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::meta::KeySemaphore;
use crate::types::{NodeId, Status};

/// Builds the primary index table name for a dimension.
pub fn primary_index_table(dimension: &str) -> String {
    format!("{}_primary_index", dimension)
}

/// Builds the resource index table name for a resource.
pub fn resource_index_table(dimension: &str, resource: &str) -> String {
    format!("{}_resource_index_{}", dimension, resource)
}

/// Builds the secondary index table name for an index on a resource.
pub fn secondary_index_table(dimension: &str, resource: &str, index: &str) -> String {
    format!("{}_secondary_index_{}_{}", dimension, resource, index)
}

/// Table definition for a primary index table.
pub fn primary_def(name: &str) -> MultimapTableDefinition<'_, &'static [u8], &'static [u8]> {
    MultimapTableDefinition::new(name)
}

/// Table definition for a resource index table.
pub fn resource_def(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// Table definition for a secondary index table.
pub fn secondary_def(name: &str) -> MultimapTableDefinition<'_, &'static [u8], &'static [u8]> {
    MultimapTableDefinition::new(name)
}

// ============================================================================
// Row entries
// ============================================================================

/// One `(node_id, read_only, last_updated)` row of a primary index table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryIndexEntry {
    /// Node holding the key's records.
    pub node_id: u32,
    /// Per-key read-only flag on that node.
    pub read_only: bool,
    /// Unix millis of the last write to this row.
    pub last_updated: i64,
}

impl PrimaryIndexEntry {
    /// Returns this row's status as a key semaphore.
    pub fn semaphore(&self) -> KeySemaphore {
        KeySemaphore::new(NodeId(self.node_id), Status::from_read_only(self.read_only))
    }
}

/// One `(primary_key, last_updated)` row of a resource index table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIndexEntry {
    /// Canonical bytes of the partition key the resource lives under.
    pub primary_key: Vec<u8>,
    /// Unix millis of the last write to this row.
    pub last_updated: i64,
}

/// One `(resource_id, last_updated)` row of a secondary index table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexEntry {
    /// Canonical bytes of the resource id the secondary key points at.
    pub resource_id: Vec<u8>,
    /// Unix millis of the last write to this row.
    pub last_updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(primary_index_table("user"), "user_primary_index");
        assert_eq!(
            resource_index_table("user", "weather"),
            "user_resource_index_weather"
        );
        assert_eq!(
            secondary_index_table("user", "weather", "city"),
            "user_secondary_index_weather_city"
        );
    }

    #[test]
    fn test_primary_entry_semaphore() {
        let entry = PrimaryIndexEntry {
            node_id: 4,
            read_only: true,
            last_updated: 0,
        };
        let semaphore = entry.semaphore();
        assert_eq!(semaphore.node_id, NodeId(4));
        assert_eq!(semaphore.status, Status::ReadOnly);
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = ResourceIndexEntry {
            primary_key: vec![1, 2, 3],
            last_updated: 99,
        };
        let bytes = bincode::serialize(&entry).unwrap();
        let restored: ResourceIndexEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(entry, restored);
    }
}
