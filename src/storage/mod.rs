//! Storage layer for the hive metadata database.
//!
//! [`HiveStore`] wraps one [redb](https://docs.rs/redb) database holding the
//! hive metadata tables and hands out the per-entity gateways. It also owns
//! the cache of directory databases, so a dimension whose `index_uri` equals
//! the hive URI shares the hive's database handle instead of re-opening the
//! file.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Hive                                  │
//! │                           │                                   │
//! │                           ▼                                   │
//! │                      HiveStore                                │
//! │     ┌──────────┬──────────┼──────────┬──────────────┐        │
//! │     ▼          ▼          ▼          ▼              ▼        │
//! │ Dimension  Resource  SecondaryIdx  Node   HiveSemaphore      │
//! │  Gateway    Gateway     Gateway   Gateway    Gateway         │
//! │     (one metadata table each)                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod gateways;
pub mod schema;

pub use gateways::{
    DimensionGateway, HiveSemaphoreGateway, NodeGateway, ResourceGateway, SecondaryIndexGateway,
};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use redb::Database;
use tracing::{debug, info};

use crate::error::{HiveError, Result, StorageError};
use crate::meta::{HiveSemaphore, Node, PartitionDimension, Resource, SecondaryIndex};
use crate::types::{DimensionId, NodeId, ResourceId, SecondaryIndexId, Status};

/// Resolves a hive URI to a filesystem path.
///
/// The embedded engine addresses databases by path; an optional `file:`
/// prefix is accepted for symmetry with connect-string style URIs.
fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file:").unwrap_or(uri))
}

/// Opens a redb database at the given URI.
fn open_database(uri: &str) -> Result<Database> {
    Database::create(uri_to_path(uri)).map_err(|e| {
        if e.to_string().contains("lock") {
            HiveError::from(StorageError::DatabaseLocked)
        } else {
            HiveError::from(StorageError::from(e))
        }
    })
}

/// Handle to a hive metadata database and its directory databases.
///
/// Cloning is cheap: clones share the same underlying database handles and
/// directory cache, which is how several in-process [`crate::Hive`]
/// instances cooperate over one hive (the embedded engine permits one open
/// handle per file per process).
#[derive(Clone)]
pub struct HiveStore {
    uri: String,
    db: Arc<Database>,
    /// Directory databases by URI, seeded with the hive database itself.
    directory_dbs: Arc<Mutex<HashMap<String, Arc<Database>>>>,
}

impl std::fmt::Debug for HiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiveStore").field("uri", &self.uri).finish_non_exhaustive()
    }
}

impl HiveStore {
    /// Opens an installed hive metadata database.
    ///
    /// # Errors
    ///
    /// Fails with [`HiveError::MetadataMissing`] if no database exists at
    /// the URI or the hive semaphore row has never been written.
    pub fn open(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        if !uri_to_path(&uri).exists() {
            return Err(HiveError::MetadataMissing(uri));
        }

        let store = Self::attach(uri)?;
        if store.semaphore().read()?.is_none() {
            return Err(HiveError::MetadataMissing(store.uri.clone()));
        }

        debug!(uri = %store.uri, "Hive store opened");
        Ok(store)
    }

    /// Creates (or opens) a hive metadata database and installs the schema.
    ///
    /// Installation writes the initial hive semaphore (revision 0,
    /// writable) and creates the metadata tables. Installing an already
    /// installed hive is a no-op, so `create` is idempotent.
    pub fn create(uri: impl Into<String>) -> Result<Self> {
        let store = Self::attach(uri.into())?;
        store.install()?;
        Ok(store)
    }

    fn attach(uri: String) -> Result<Self> {
        let db = Arc::new(open_database(&uri)?);
        let mut dbs = HashMap::new();
        dbs.insert(uri.clone(), Arc::clone(&db));
        Ok(Self {
            uri,
            db,
            directory_dbs: Arc::new(Mutex::new(dbs)),
        })
    }

    fn install(&self) -> Result<()> {
        if self.semaphore().read()?.is_some() {
            return Ok(());
        }

        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            use crate::storage::schema as s;
            let mut semaphores = txn.open_table(s::HIVE_SEMAPHORE_TABLE)?;
            let row = s::SemaphoreRow::from_semaphore(&HiveSemaphore::initial());
            semaphores.insert(s::HIVE_SEMAPHORE_KEY, bincode::serialize(&row)?.as_slice())?;

            // Create the remaining tables up front so load_all never races
            // table creation.
            let _ = txn.open_table(s::DIMENSION_TABLE)?;
            let _ = txn.open_table(s::RESOURCE_TABLE)?;
            let _ = txn.open_table(s::SECONDARY_INDEX_TABLE)?;
            let _ = txn.open_table(s::NODE_TABLE)?;
            let _ = txn.open_table(s::SEQUENCE_TABLE)?;
        }
        txn.commit().map_err(StorageError::from)?;

        info!(uri = %self.uri, "Hive metadata schema installed");
        Ok(())
    }

    /// Returns the URI this store was opened at.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the dimension gateway.
    pub fn dimensions(&self) -> DimensionGateway {
        DimensionGateway::new(Arc::clone(&self.db))
    }

    /// Returns the resource gateway.
    pub fn resources(&self) -> ResourceGateway {
        ResourceGateway::new(Arc::clone(&self.db))
    }

    /// Returns the secondary index gateway.
    pub fn secondary_indexes(&self) -> SecondaryIndexGateway {
        SecondaryIndexGateway::new(Arc::clone(&self.db))
    }

    /// Returns the node gateway.
    pub fn nodes(&self) -> NodeGateway {
        NodeGateway::new(Arc::clone(&self.db))
    }

    /// Returns the hive semaphore gateway.
    pub fn semaphore(&self) -> HiveSemaphoreGateway {
        HiveSemaphoreGateway::new(Arc::clone(&self.db))
    }

    /// Returns the directory database for a dimension.
    ///
    /// `index_uri = None` means the hive database. Distinct URIs are opened
    /// once and cached for the life of the store.
    pub fn directory_database(&self, index_uri: Option<&str>) -> Result<Arc<Database>> {
        let uri = index_uri.unwrap_or(&self.uri);
        let mut dbs = self
            .directory_dbs
            .lock()
            .map_err(|_| StorageError::corrupted("directory database cache lock poisoned"))?;
        if let Some(db) = dbs.get(uri) {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(open_database(uri)?);
        dbs.insert(uri.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Reloads every metadata gateway and assembles a fresh object graph.
    ///
    /// Children are attached to their parents by id and sorted by id so two
    /// loads of the same store produce equal graphs. An orphan row (child
    /// without a live parent) indicates a corrupted store.
    pub fn load_graph(&self) -> Result<(HiveSemaphore, BTreeMap<String, PartitionDimension>)> {
        let semaphore = self
            .semaphore()
            .read()?
            .ok_or_else(|| HiveError::MetadataMissing(self.uri.clone()))?;

        let dimension_rows = self.dimensions().load_all()?;
        let resource_rows = self.resources().load_all()?;
        let index_rows = self.secondary_indexes().load_all()?;
        let node_rows = self.nodes().load_all()?;

        let mut dimensions_by_id: BTreeMap<u32, PartitionDimension> = BTreeMap::new();
        for row in dimension_rows {
            dimensions_by_id.insert(
                row.id,
                PartitionDimension {
                    id: DimensionId(row.id),
                    name: row.name,
                    key_type: row.key_type,
                    index_uri: row.index_uri,
                    resources: Vec::new(),
                    nodes: Vec::new(),
                },
            );
        }

        let mut resources_by_id: BTreeMap<u32, (u32, Resource)> = BTreeMap::new();
        for row in resource_rows {
            let dimension = dimensions_by_id.get(&row.dimension_id).ok_or_else(|| {
                StorageError::corrupted(format!(
                    "resource '{}' references missing dimension {}",
                    row.name, row.dimension_id
                ))
            })?;
            resources_by_id.insert(
                row.id,
                (
                    row.dimension_id,
                    Resource {
                        id: ResourceId(row.id),
                        name: row.name,
                        key_type: row.key_type,
                        is_partitioning: row.is_partitioning,
                        secondary_indexes: Vec::new(),
                        dimension: dimension.name.clone(),
                    },
                ),
            );
        }

        for row in index_rows {
            let (_, resource) = resources_by_id.get_mut(&row.resource_id).ok_or_else(|| {
                StorageError::corrupted(format!(
                    "secondary index '{}' references missing resource {}",
                    row.name, row.resource_id
                ))
            })?;
            resource.secondary_indexes.push(SecondaryIndex {
                id: SecondaryIndexId(row.id),
                name: row.name,
                column_type: row.column_type,
                resource: resource.name.clone(),
            });
        }

        for (_, (dimension_id, resource)) in resources_by_id {
            // Parent presence was checked when the resource was collected
            if let Some(dimension) = dimensions_by_id.get_mut(&dimension_id) {
                dimension.resources.push(resource);
            }
        }

        for row in node_rows {
            let dimension = dimensions_by_id.get_mut(&row.dimension_id).ok_or_else(|| {
                StorageError::corrupted(format!(
                    "node '{}' references missing dimension {}",
                    row.name, row.dimension_id
                ))
            })?;
            let dimension_name = dimension.name.clone();
            dimension.nodes.push(Node {
                id: NodeId(row.id),
                name: row.name,
                uri: row.uri,
                status: Status::from_read_only(row.read_only),
                dimension: dimension_name,
            });
        }

        let mut dimensions = BTreeMap::new();
        for (_, mut dimension) in dimensions_by_id {
            dimension.resources.sort_by_key(|r| r.id);
            for resource in &mut dimension.resources {
                resource.secondary_indexes.sort_by_key(|i| i.id);
            }
            dimension.nodes.sort_by_key(|n| n.id);
            dimensions.insert(dimension.name.clone(), dimension);
        }

        Ok((semaphore, dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyType;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_database_is_metadata_missing() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("absent.db").display().to_string();

        let err = HiveStore::open(&uri).unwrap_err();
        assert!(matches!(err, HiveError::MetadataMissing(_)));
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("hive.db").display().to_string();

        let store = HiveStore::create(&uri).unwrap();
        let (semaphore, dimensions) = store.load_graph().unwrap();
        assert_eq!(semaphore, HiveSemaphore::initial());
        assert!(dimensions.is_empty());
        drop(store);

        // Reopen through the load path
        let store = HiveStore::open(&uri).unwrap();
        assert!(store.semaphore().read().unwrap().is_some());
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("hive.db").display().to_string();

        let store = HiveStore::create(&uri).unwrap();
        store.semaphore().increment().unwrap();
        drop(store);

        // A second create must not reset the revision
        let store = HiveStore::create(&uri).unwrap();
        assert_eq!(store.semaphore().read().unwrap().unwrap().revision, 1);
    }

    #[test]
    fn test_file_uri_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hive.db");
        let uri = format!("file:{}", path.display());

        HiveStore::create(&uri).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_directory_database_shares_hive_handle() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("hive.db").display().to_string();
        let store = HiveStore::create(&uri).unwrap();

        let a = store.directory_database(None).unwrap();
        let b = store.directory_database(Some(&uri)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_load_graph_assembles_children() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("hive.db").display().to_string();
        let store = HiveStore::create(&uri).unwrap();

        let dim_id = store
            .dimensions()
            .create(&PartitionDimension::new("user", KeyType::Integer))
            .unwrap();
        let res_id = store
            .resources()
            .create(dim_id, &Resource::new("weather", KeyType::Integer, false))
            .unwrap();
        store
            .secondary_indexes()
            .create(res_id, &SecondaryIndex::new("city", KeyType::Text))
            .unwrap();
        store.nodes().create(dim_id, &Node::new("n1", "db://a")).unwrap();

        let (_, dimensions) = store.load_graph().unwrap();
        let dimension = dimensions.get("user").unwrap();
        assert_eq!(dimension.id, dim_id);
        assert_eq!(dimension.resources.len(), 1);
        assert_eq!(dimension.nodes.len(), 1);

        let resource = dimension.resource("weather").unwrap();
        assert_eq!(resource.dimension, "user");
        assert!(resource.secondary_index("city").is_some());
        assert_eq!(resource.secondary_index("city").unwrap().resource, "weather");
    }

    #[test]
    fn test_load_graph_twice_is_equal() {
        let dir = tempdir().unwrap();
        let uri = dir.path().join("hive.db").display().to_string();
        let store = HiveStore::create(&uri).unwrap();

        let dim_id = store
            .dimensions()
            .create(&PartitionDimension::new("user", KeyType::Integer))
            .unwrap();
        store.nodes().create(dim_id, &Node::new("n1", "db://a")).unwrap();
        store.nodes().create(dim_id, &Node::new("n2", "db://b")).unwrap();

        let first = store.load_graph().unwrap();
        let second = store.load_graph().unwrap();
        assert_eq!(first, second);
    }
}
