//! Type definitions for the hive metadata model.
//!
//! These are pure value objects: no entity holds a live connection or an
//! owning back-pointer. The graph stores forward references only (dimension
//! → resources → indexes, dimension → nodes); each child carries the name of
//! its parent as a lookup handle, filled in by the hive facade when the
//! child is added. Back-lookups go through the facade's name-indexed map.
//!
//! Equality is structural over all fields, so two graphs loaded from the
//! same gateways compare equal.

use serde::{Deserialize, Serialize};

use crate::types::{DimensionId, KeyType, NodeId, ResourceId, SecondaryIndexId, Status};

/// A named partitioning axis.
///
/// A hive typically has one dimension; multiple are permitted. The
/// dimension owns its resources and nodes; its directory tables live in the
/// database addressed by [`index_uri`](Self::index_uri), defaulting to the
/// hive metadata URI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDimension {
    /// Gateway-assigned id; [`DimensionId::UNSAVED`] until persisted.
    pub id: DimensionId,
    /// Name, unique within the hive.
    pub name: String,
    /// Type of this dimension's partition keys.
    pub key_type: KeyType,
    /// URI of the directory database; `None` means the hive URI.
    pub index_uri: Option<String>,
    /// Entity classes partitioned along this dimension.
    pub resources: Vec<Resource>,
    /// Physical shards of this dimension.
    pub nodes: Vec<Node>,
}

impl PartitionDimension {
    /// Creates an unsaved dimension with no resources or nodes.
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            id: DimensionId::UNSAVED,
            name: name.into(),
            key_type,
            index_uri: None,
            resources: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Looks up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Looks up a node by id.
    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns the nodes currently accepting writes.
    pub fn writable_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| n.status.is_writable())
            .cloned()
            .collect()
    }
}

/// A named entity class partitioned along a dimension.
///
/// If [`is_partitioning`](Self::is_partitioning) is true the resource's id
/// *is* the partition key: inserting a resource id routes straight to the
/// primary index, and the primary-key-of-resource-id mapping is the
/// identity function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Gateway-assigned id; [`ResourceId::UNSAVED`] until persisted.
    pub id: ResourceId,
    /// Name, unique within the dimension.
    pub name: String,
    /// Type of this resource's id values.
    pub key_type: KeyType,
    /// Whether the resource id is itself the partition key.
    pub is_partitioning: bool,
    /// Attribute indexes on this resource.
    pub secondary_indexes: Vec<SecondaryIndex>,
    /// Name of the owning dimension (lookup handle, set on add).
    pub dimension: String,
}

impl Resource {
    /// Creates an unsaved resource with no secondary indexes.
    pub fn new(name: impl Into<String>, key_type: KeyType, is_partitioning: bool) -> Self {
        Self {
            id: ResourceId::UNSAVED,
            name: name.into(),
            key_type,
            is_partitioning,
            secondary_indexes: Vec::new(),
            dimension: String::new(),
        }
    }

    /// Looks up a secondary index by name.
    pub fn secondary_index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.secondary_indexes.iter().find(|i| i.name == name)
    }
}

/// A named attribute index on a resource.
///
/// Maps values of one attribute to resource ids, so records can be located
/// by attributes other than the partition key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    /// Gateway-assigned id; [`SecondaryIndexId::UNSAVED`] until persisted.
    pub id: SecondaryIndexId,
    /// Name, unique within the resource.
    pub name: String,
    /// Type of the indexed column's values.
    pub column_type: KeyType,
    /// Name of the owning resource (lookup handle, set on add).
    pub resource: String,
}

impl SecondaryIndex {
    /// Creates an unsaved secondary index.
    pub fn new(name: impl Into<String>, column_type: KeyType) -> Self {
        Self {
            id: SecondaryIndexId::UNSAVED,
            name: name.into(),
            column_type,
            resource: String::new(),
        }
    }
}

/// A physical shard of a dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Gateway-assigned id; [`NodeId::UNSAVED`] until persisted.
    pub id: NodeId,
    /// Name, unique within the dimension.
    pub name: String,
    /// Connect string handed to the [`crate::ConnectionSource`].
    pub uri: String,
    /// Whether this node currently accepts writes.
    pub status: Status,
    /// Name of the owning dimension (lookup handle, set on add).
    pub dimension: String,
}

impl Node {
    /// Creates an unsaved writable node.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: NodeId::UNSAVED,
            name: name.into(),
            uri: uri.into(),
            status: Status::Writable,
            dimension: String::new(),
        }
    }

    /// Creates an unsaved node with an explicit status.
    pub fn with_status(name: impl Into<String>, uri: impl Into<String>, status: Status) -> Self {
        Self {
            status,
            ..Self::new(name, uri)
        }
    }
}

/// The status record binding one partition key to one node.
///
/// A partition key maps to at least one semaphore; a key living on several
/// nodes maps to several. The key is effectively read-only iff *any* of its
/// semaphores (or their nodes, or the hive) is read-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySemaphore {
    /// The node holding the key's records.
    pub node_id: NodeId,
    /// Per-key writability on that node.
    pub status: Status,
}

impl KeySemaphore {
    /// Creates a semaphore for a key on `node_id`.
    pub fn new(node_id: NodeId, status: Status) -> Self {
        Self { node_id, status }
    }
}

/// The global coordination record: revision counter plus hive-wide status.
///
/// A single row in the hive metadata database. The revision is bumped
/// exactly once per metadata mutation committed through the hive facade;
/// cooperating hive instances compare it against their cached value to
/// detect that a reload is due.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveSemaphore {
    /// Monotonically non-decreasing metadata revision.
    pub revision: u64,
    /// Hive-wide writability.
    pub status: Status,
}

impl HiveSemaphore {
    /// The initial semaphore written on install: revision 0, writable.
    pub fn initial() -> Self {
        Self {
            revision: 0,
            status: Status::Writable,
        }
    }

    /// Returns a copy with the revision advanced by one.
    pub fn advance(&self) -> Self {
        Self {
            revision: self.revision + 1,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_lookups() {
        let mut dim = PartitionDimension::new("user", KeyType::Integer);
        dim.resources.push(Resource::new("weather", KeyType::Integer, false));
        dim.nodes.push(Node {
            id: NodeId(1),
            ..Node::new("n1", "db://a")
        });

        assert!(dim.resource("weather").is_some());
        assert!(dim.resource("missing").is_none());
        assert!(dim.node("n1").is_some());
        assert!(dim.node_by_id(NodeId(1)).is_some());
        assert!(dim.node_by_id(NodeId(2)).is_none());
    }

    #[test]
    fn test_writable_nodes_filters_read_only() {
        let mut dim = PartitionDimension::new("user", KeyType::Integer);
        dim.nodes.push(Node {
            id: NodeId(1),
            ..Node::new("n1", "db://a")
        });
        dim.nodes.push(Node {
            id: NodeId(2),
            ..Node::with_status("n2", "db://b", Status::ReadOnly)
        });

        let writable = dim.writable_nodes();
        assert_eq!(writable.len(), 1);
        assert_eq!(writable[0].name, "n1");
    }

    #[test]
    fn test_new_entities_are_unsaved() {
        assert!(PartitionDimension::new("d", KeyType::Text).id.is_unsaved());
        assert!(Resource::new("r", KeyType::Text, false).id.is_unsaved());
        assert!(SecondaryIndex::new("i", KeyType::Text).id.is_unsaved());
        assert!(Node::new("n", "db://x").id.is_unsaved());
    }

    #[test]
    fn test_structural_equality() {
        let a = Resource::new("weather", KeyType::Integer, false);
        let b = Resource::new("weather", KeyType::Integer, false);
        assert_eq!(a, b);

        let c = Resource::new("weather", KeyType::Integer, true);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hive_semaphore_advance() {
        let sem = HiveSemaphore::initial();
        assert_eq!(sem.revision, 0);
        assert_eq!(sem.advance().revision, 1);
        assert_eq!(sem.advance().status, sem.status);
    }

    #[test]
    fn test_semaphore_serialization() {
        let sem = KeySemaphore::new(NodeId(3), Status::ReadOnly);
        let bytes = bincode::serialize(&sem).unwrap();
        let restored: KeySemaphore = bincode::deserialize(&bytes).unwrap();
        assert_eq!(sem, restored);
    }
}
