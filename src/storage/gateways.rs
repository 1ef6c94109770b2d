//! Persistence gateways for the hive metadata database.
//!
//! One gateway per metadata entity, each owning exactly one table of the
//! hive metadata database. Gateways are mechanical: they enforce id and
//! name uniqueness at the row level but know nothing about locks or
//! revisions — that is the hive facade's job.
//!
//! All gateways share the same [`redb::Database`] handle; each call opens
//! and commits its own transaction.

use std::sync::Arc;

use redb::{Database, ReadableTable};

use super::schema::{
    DimensionRow, NodeRow, ResourceRow, SecondaryIndexRow, SemaphoreRow, DIMENSION_TABLE,
    HIVE_SEMAPHORE_KEY, HIVE_SEMAPHORE_TABLE, NODE_TABLE, RESOURCE_TABLE, SECONDARY_INDEX_TABLE,
    SEQUENCE_TABLE,
};
use crate::error::{HiveError, NotFoundError, Result, StorageError};
use crate::meta::{HiveSemaphore, Node, PartitionDimension, Resource, SecondaryIndex};
use crate::types::{DimensionId, NodeId, ResourceId, SecondaryIndexId, Status};

/// Allocates the next id for `kind` inside an open write transaction.
///
/// Counters live in the `sequences` table, one per entity kind. Ids start
/// at 1; 0 is the unsaved sentinel and is never handed out.
fn next_id(txn: &redb::WriteTransaction, kind: &str) -> Result<u32> {
    let mut table = txn.open_table(SEQUENCE_TABLE)?;
    let last = table.get(kind)?.map(|v| v.value()).unwrap_or(0);
    let next = last + 1;
    table.insert(kind, next)?;
    Ok(next)
}

// ============================================================================
// Dimension gateway
// ============================================================================

/// CRUD for the `partition_dimension` table.
#[derive(Clone)]
pub struct DimensionGateway {
    db: Arc<Database>,
}

impl DimensionGateway {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persists a new dimension and returns its assigned id.
    ///
    /// Fails with [`HiveError::DuplicateName`] if a dimension with the same
    /// name already exists.
    pub fn create(&self, dimension: &PartitionDimension) -> Result<DimensionId> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let id = {
            let mut table = txn.open_table(DIMENSION_TABLE)?;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let row: DimensionRow = bincode::deserialize(value.value())?;
                if row.name == dimension.name {
                    return Err(HiveError::duplicate_name("dimension", &dimension.name, "hive"));
                }
            }

            let id = next_id(&txn, "partition_dimension")?;
            let row = DimensionRow {
                id,
                name: dimension.name.clone(),
                key_type: dimension.key_type,
                index_uri: dimension.index_uri.clone(),
            };
            table.insert(id, bincode::serialize(&row)?.as_slice())?;
            id
        };
        txn.commit().map_err(StorageError::from)?;
        Ok(DimensionId(id))
    }

    /// Rewrites an existing dimension row.
    ///
    /// Fails with [`NotFoundError::Dimension`] if the id is unknown and
    /// with [`HiveError::DuplicateName`] if the new name collides with a
    /// sibling.
    pub fn update(&self, dimension: &PartitionDimension) -> Result<()> {
        if dimension.id.is_unsaved() {
            return Err(StorageError::unsaved_id("dimension", "update").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(DIMENSION_TABLE)?;
            if table.get(dimension.id.0)?.is_none() {
                return Err(NotFoundError::dimension(&dimension.name).into());
            }
            for entry in table.iter()? {
                let (key, value) = entry?;
                if key.value() == dimension.id.0 {
                    continue;
                }
                let row: DimensionRow = bincode::deserialize(value.value())?;
                if row.name == dimension.name {
                    return Err(HiveError::duplicate_name("dimension", &dimension.name, "hive"));
                }
            }

            let row = DimensionRow {
                id: dimension.id.0,
                name: dimension.name.clone(),
                key_type: dimension.key_type,
                index_uri: dimension.index_uri.clone(),
            };
            table.insert(dimension.id.0, bincode::serialize(&row)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Removes a dimension row.
    ///
    /// Fails with [`NotFoundError::Dimension`] if the id is unknown.
    pub fn delete(&self, id: DimensionId) -> Result<()> {
        if id.is_unsaved() {
            return Err(StorageError::unsaved_id("dimension", "delete").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(DIMENSION_TABLE)?;
            if table.remove(id.0)?.is_none() {
                return Err(NotFoundError::dimension(id).into());
            }
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads every dimension row.
    pub fn load_all(&self) -> Result<Vec<DimensionRow>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = txn.open_table(DIMENSION_TABLE)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rows.push(bincode::deserialize(value.value())?);
        }
        Ok(rows)
    }
}

// ============================================================================
// Resource gateway
// ============================================================================

/// CRUD for the `resource` table.
#[derive(Clone)]
pub struct ResourceGateway {
    db: Arc<Database>,
}

impl ResourceGateway {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persists a new resource under `dimension_id` and returns its id.
    ///
    /// Fails with [`HiveError::DuplicateName`] if the dimension already has
    /// a resource with this name.
    pub fn create(&self, dimension_id: DimensionId, resource: &Resource) -> Result<ResourceId> {
        if dimension_id.is_unsaved() {
            return Err(StorageError::unsaved_id("resource", "create").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let id = {
            let mut table = txn.open_table(RESOURCE_TABLE)?;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let row: ResourceRow = bincode::deserialize(value.value())?;
                if row.dimension_id == dimension_id.0 && row.name == resource.name {
                    return Err(HiveError::duplicate_name(
                        "resource",
                        &resource.name,
                        &resource.dimension,
                    ));
                }
            }

            let id = next_id(&txn, "resource")?;
            let row = ResourceRow {
                id,
                dimension_id: dimension_id.0,
                name: resource.name.clone(),
                key_type: resource.key_type,
                is_partitioning: resource.is_partitioning,
            };
            table.insert(id, bincode::serialize(&row)?.as_slice())?;
            id
        };
        txn.commit().map_err(StorageError::from)?;
        Ok(ResourceId(id))
    }

    /// Rewrites an existing resource row.
    pub fn update(&self, dimension_id: DimensionId, resource: &Resource) -> Result<()> {
        if resource.id.is_unsaved() {
            return Err(StorageError::unsaved_id("resource", "update").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(RESOURCE_TABLE)?;
            if table.get(resource.id.0)?.is_none() {
                return Err(NotFoundError::resource(&resource.name).into());
            }
            for entry in table.iter()? {
                let (key, value) = entry?;
                if key.value() == resource.id.0 {
                    continue;
                }
                let row: ResourceRow = bincode::deserialize(value.value())?;
                if row.dimension_id == dimension_id.0 && row.name == resource.name {
                    return Err(HiveError::duplicate_name(
                        "resource",
                        &resource.name,
                        &resource.dimension,
                    ));
                }
            }

            let row = ResourceRow {
                id: resource.id.0,
                dimension_id: dimension_id.0,
                name: resource.name.clone(),
                key_type: resource.key_type,
                is_partitioning: resource.is_partitioning,
            };
            table.insert(resource.id.0, bincode::serialize(&row)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Removes a resource row.
    pub fn delete(&self, id: ResourceId) -> Result<()> {
        if id.is_unsaved() {
            return Err(StorageError::unsaved_id("resource", "delete").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(RESOURCE_TABLE)?;
            if table.remove(id.0)?.is_none() {
                return Err(NotFoundError::resource(id).into());
            }
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads every resource row.
    pub fn load_all(&self) -> Result<Vec<ResourceRow>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = txn.open_table(RESOURCE_TABLE)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rows.push(bincode::deserialize(value.value())?);
        }
        Ok(rows)
    }
}

// ============================================================================
// Secondary index gateway
// ============================================================================

/// CRUD for the `secondary_index` table.
#[derive(Clone)]
pub struct SecondaryIndexGateway {
    db: Arc<Database>,
}

impl SecondaryIndexGateway {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persists a new secondary index under `resource_id` and returns its id.
    pub fn create(&self, resource_id: ResourceId, index: &SecondaryIndex) -> Result<SecondaryIndexId> {
        if resource_id.is_unsaved() {
            return Err(StorageError::unsaved_id("secondary index", "create").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let id = {
            let mut table = txn.open_table(SECONDARY_INDEX_TABLE)?;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let row: SecondaryIndexRow = bincode::deserialize(value.value())?;
                if row.resource_id == resource_id.0 && row.name == index.name {
                    return Err(HiveError::duplicate_name(
                        "secondary index",
                        &index.name,
                        &index.resource,
                    ));
                }
            }

            let id = next_id(&txn, "secondary_index")?;
            let row = SecondaryIndexRow {
                id,
                resource_id: resource_id.0,
                name: index.name.clone(),
                column_type: index.column_type,
            };
            table.insert(id, bincode::serialize(&row)?.as_slice())?;
            id
        };
        txn.commit().map_err(StorageError::from)?;
        Ok(SecondaryIndexId(id))
    }

    /// Rewrites an existing secondary index row.
    pub fn update(&self, resource_id: ResourceId, index: &SecondaryIndex) -> Result<()> {
        if index.id.is_unsaved() {
            return Err(StorageError::unsaved_id("secondary index", "update").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(SECONDARY_INDEX_TABLE)?;
            if table.get(index.id.0)?.is_none() {
                return Err(NotFoundError::secondary_index(&index.name).into());
            }
            for entry in table.iter()? {
                let (key, value) = entry?;
                if key.value() == index.id.0 {
                    continue;
                }
                let row: SecondaryIndexRow = bincode::deserialize(value.value())?;
                if row.resource_id == resource_id.0 && row.name == index.name {
                    return Err(HiveError::duplicate_name(
                        "secondary index",
                        &index.name,
                        &index.resource,
                    ));
                }
            }

            let row = SecondaryIndexRow {
                id: index.id.0,
                resource_id: resource_id.0,
                name: index.name.clone(),
                column_type: index.column_type,
            };
            table.insert(index.id.0, bincode::serialize(&row)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Removes a secondary index row.
    pub fn delete(&self, id: SecondaryIndexId) -> Result<()> {
        if id.is_unsaved() {
            return Err(StorageError::unsaved_id("secondary index", "delete").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(SECONDARY_INDEX_TABLE)?;
            if table.remove(id.0)?.is_none() {
                return Err(NotFoundError::secondary_index(id).into());
            }
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads every secondary index row.
    pub fn load_all(&self) -> Result<Vec<SecondaryIndexRow>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = txn.open_table(SECONDARY_INDEX_TABLE)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rows.push(bincode::deserialize(value.value())?);
        }
        Ok(rows)
    }
}

// ============================================================================
// Node gateway
// ============================================================================

/// CRUD for the `node` table.
#[derive(Clone)]
pub struct NodeGateway {
    db: Arc<Database>,
}

impl NodeGateway {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persists a new node under `dimension_id` and returns its id.
    pub fn create(&self, dimension_id: DimensionId, node: &Node) -> Result<NodeId> {
        if dimension_id.is_unsaved() {
            return Err(StorageError::unsaved_id("node", "create").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let id = {
            let mut table = txn.open_table(NODE_TABLE)?;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let row: NodeRow = bincode::deserialize(value.value())?;
                if row.dimension_id == dimension_id.0 && row.name == node.name {
                    return Err(HiveError::duplicate_name("node", &node.name, &node.dimension));
                }
            }

            let id = next_id(&txn, "node")?;
            let row = NodeRow {
                id,
                dimension_id: dimension_id.0,
                name: node.name.clone(),
                uri: node.uri.clone(),
                read_only: node.status.is_read_only(),
            };
            table.insert(id, bincode::serialize(&row)?.as_slice())?;
            id
        };
        txn.commit().map_err(StorageError::from)?;
        Ok(NodeId(id))
    }

    /// Rewrites an existing node row.
    pub fn update(&self, dimension_id: DimensionId, node: &Node) -> Result<()> {
        if node.id.is_unsaved() {
            return Err(StorageError::unsaved_id("node", "update").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(NODE_TABLE)?;
            if table.get(node.id.0)?.is_none() {
                return Err(NotFoundError::node(&node.name).into());
            }
            for entry in table.iter()? {
                let (key, value) = entry?;
                if key.value() == node.id.0 {
                    continue;
                }
                let row: NodeRow = bincode::deserialize(value.value())?;
                if row.dimension_id == dimension_id.0 && row.name == node.name {
                    return Err(HiveError::duplicate_name("node", &node.name, &node.dimension));
                }
            }

            let row = NodeRow {
                id: node.id.0,
                dimension_id: dimension_id.0,
                name: node.name.clone(),
                uri: node.uri.clone(),
                read_only: node.status.is_read_only(),
            };
            table.insert(node.id.0, bincode::serialize(&row)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Removes a node row.
    pub fn delete(&self, id: NodeId) -> Result<()> {
        if id.is_unsaved() {
            return Err(StorageError::unsaved_id("node", "delete").into());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(NODE_TABLE)?;
            if table.remove(id.0)?.is_none() {
                return Err(NotFoundError::node(id).into());
            }
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads every node row.
    pub fn load_all(&self) -> Result<Vec<NodeRow>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = txn.open_table(NODE_TABLE)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rows.push(bincode::deserialize(value.value())?);
        }
        Ok(rows)
    }
}

// ============================================================================
// Hive semaphore gateway
// ============================================================================

/// Access to the `hive_semaphore` singleton row.
///
/// The write paths here are crate-private on purpose: the hive facade is
/// the single writer to the semaphore, so all status changes and revision
/// bumps flow through it.
#[derive(Clone)]
pub struct HiveSemaphoreGateway {
    db: Arc<Database>,
}

impl HiveSemaphoreGateway {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Reads the semaphore row.
    ///
    /// Returns `None` when the schema has never been installed (the table
    /// or the row is absent).
    pub fn read(&self) -> Result<Option<HiveSemaphore>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = match txn.open_table(HIVE_SEMAPHORE_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::from(e).into()),
        };
        match table.get(HIVE_SEMAPHORE_KEY)? {
            Some(value) => {
                let row: SemaphoreRow = bincode::deserialize(value.value())?;
                Ok(Some(row.to_semaphore()))
            }
            None => Ok(None),
        }
    }

    /// Writes the semaphore row, overwriting any previous value.
    pub(crate) fn write(&self, semaphore: &HiveSemaphore) -> Result<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(HIVE_SEMAPHORE_TABLE)?;
            let row = SemaphoreRow::from_semaphore(semaphore);
            table.insert(HIVE_SEMAPHORE_KEY, bincode::serialize(&row)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Atomically bumps the revision by one and returns the new semaphore.
    ///
    /// Read-modify-write in a single write transaction so concurrent
    /// facade mutations cannot lose a bump.
    pub(crate) fn increment(&self) -> Result<HiveSemaphore> {
        self.advance(None)
    }

    /// Atomically bumps the revision and sets the hive status.
    pub(crate) fn update_status(&self, status: Status) -> Result<HiveSemaphore> {
        self.advance(Some(status))
    }

    fn advance(&self, status: Option<Status>) -> Result<HiveSemaphore> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let updated = {
            let mut table = txn.open_table(HIVE_SEMAPHORE_TABLE)?;
            let current = match table.get(HIVE_SEMAPHORE_KEY)? {
                Some(value) => bincode::deserialize::<SemaphoreRow>(value.value())?.to_semaphore(),
                None => {
                    return Err(StorageError::corrupted("hive semaphore row missing").into());
                }
            };

            let updated = HiveSemaphore {
                revision: current.revision + 1,
                status: status.unwrap_or(current.status),
            };
            let row = SemaphoreRow::from_semaphore(&updated);
            table.insert(HIVE_SEMAPHORE_KEY, bincode::serialize(&row)?.as_slice())?;
            updated
        };
        txn.commit().map_err(StorageError::from)?;
        Ok(updated)
    }
}
