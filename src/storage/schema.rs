//! Hive metadata database schema.
//!
//! This module defines the table structure of the hive metadata database.
//! Each gateway owns exactly one of these tables; the row structs here are
//! the bincode-serialized values.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ partition_dimension                                          │
//! │   Key: u32 (dimension id)                                    │
//! │   Value: &[u8] (bincode DimensionRow)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │ resource            u32 → ResourceRow                        │
//! │ secondary_index     u32 → SecondaryIndexRow                  │
//! │ node                u32 → NodeRow                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │ hive_semaphore                                               │
//! │   Key: &str ("hive_semaphore" — singleton row)               │
//! │   Value: &[u8] (bincode SemaphoreRow)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │ sequences                                                    │
//! │   Key: &str (entity kind)                                    │
//! │   Value: u32 (last id handed out)                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::{KeyType, Status};

/// Partition dimension rows, keyed by dimension id.
pub const DIMENSION_TABLE: TableDefinition<u32, &[u8]> =
    TableDefinition::new("partition_dimension");

/// Resource rows, keyed by resource id.
pub const RESOURCE_TABLE: TableDefinition<u32, &[u8]> = TableDefinition::new("resource");

/// Secondary index rows, keyed by index id.
pub const SECONDARY_INDEX_TABLE: TableDefinition<u32, &[u8]> =
    TableDefinition::new("secondary_index");

/// Node rows, keyed by node id.
pub const NODE_TABLE: TableDefinition<u32, &[u8]> = TableDefinition::new("node");

/// The hive semaphore singleton.
pub const HIVE_SEMAPHORE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("hive_semaphore");

/// Id sequences, one counter per entity kind.
pub const SEQUENCE_TABLE: TableDefinition<&str, u32> = TableDefinition::new("sequences");

/// Key of the singleton row in [`HIVE_SEMAPHORE_TABLE`].
pub const HIVE_SEMAPHORE_KEY: &str = "hive_semaphore";

// ============================================================================
// Row structs
// ============================================================================

/// Persisted form of a partition dimension (without children).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    /// Dimension id, equal to the table key.
    pub id: u32,
    /// Name, unique within the hive.
    pub name: String,
    /// Partition key type.
    pub key_type: KeyType,
    /// Directory database URI; `None` means the hive URI.
    pub index_uri: Option<String>,
}

/// Persisted form of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRow {
    /// Resource id, equal to the table key.
    pub id: u32,
    /// Owning dimension id.
    pub dimension_id: u32,
    /// Name, unique within the dimension.
    pub name: String,
    /// Resource id type.
    pub key_type: KeyType,
    /// Whether the resource id is itself the partition key.
    pub is_partitioning: bool,
}

/// Persisted form of a secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexRow {
    /// Index id, equal to the table key.
    pub id: u32,
    /// Owning resource id.
    pub resource_id: u32,
    /// Name, unique within the resource.
    pub name: String,
    /// Indexed column type.
    pub column_type: KeyType,
}

/// Persisted form of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    /// Node id, equal to the table key.
    pub id: u32,
    /// Owning dimension id.
    pub dimension_id: u32,
    /// Name, unique within the dimension.
    pub name: String,
    /// Connect string of the physical shard.
    pub uri: String,
    /// Whether the node refuses writes.
    pub read_only: bool,
}

/// Persisted form of the hive semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreRow {
    /// Metadata revision.
    pub revision: u64,
    /// Whether the whole hive refuses writes.
    pub read_only: bool,
}

impl SemaphoreRow {
    /// Converts from the in-memory semaphore.
    pub fn from_semaphore(sem: &crate::meta::HiveSemaphore) -> Self {
        Self {
            revision: sem.revision,
            read_only: sem.status.is_read_only(),
        }
    }

    /// Converts to the in-memory semaphore.
    pub fn to_semaphore(self) -> crate::meta::HiveSemaphore {
        crate::meta::HiveSemaphore {
            revision: self.revision,
            status: Status::from_read_only(self.read_only),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::HiveSemaphore;

    #[test]
    fn test_dimension_row_roundtrip() {
        let row = DimensionRow {
            id: 1,
            name: "user".to_string(),
            key_type: KeyType::Integer,
            index_uri: None,
        };
        let bytes = bincode::serialize(&row).unwrap();
        let restored: DimensionRow = bincode::deserialize(&bytes).unwrap();
        assert_eq!(row, restored);
    }

    #[test]
    fn test_node_row_roundtrip() {
        let row = NodeRow {
            id: 7,
            dimension_id: 1,
            name: "n1".to_string(),
            uri: "db://a".to_string(),
            read_only: true,
        };
        let bytes = bincode::serialize(&row).unwrap();
        let restored: NodeRow = bincode::deserialize(&bytes).unwrap();
        assert_eq!(row, restored);
    }

    #[test]
    fn test_semaphore_row_conversion() {
        let sem = HiveSemaphore::initial();
        let row = SemaphoreRow::from_semaphore(&sem);
        assert_eq!(row.revision, 0);
        assert!(!row.read_only);
        assert_eq!(row.to_semaphore(), sem);
    }
}
