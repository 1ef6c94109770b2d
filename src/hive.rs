//! Hive facade: the public coordination surface of a partitioned deployment.
//!
//! The [`Hive`] owns the in-memory metadata graph, the per-dimension
//! directories, and the revision-driven synchronization with cooperating
//! instances. Every metadata mutation flows through it: writability check,
//! uniqueness validation, gateway persist, revision bump, sync.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hivedir::{Access, Hive, HiveConfig, KeyType, KeyValue, Node, PartitionDimension};
//!
//! // Install and open a hive
//! let hive = Hive::create(HiveConfig::new("./hive.db"))?;
//!
//! // Describe the deployment
//! hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))?;
//! hive.add_node("user", Node::new("n1", "db://a"))?;
//!
//! // Route a key and connect to its shard
//! hive.insert_primary_index_key("user", &KeyValue::from(42i64))?;
//! let conn = hive.connection("user", &KeyValue::from(42i64), Access::Read)?;
//!
//! hive.close()?;
//! ```
//!
//! # Thread Safety
//!
//! `Hive` is `Send + Sync` and can be shared across threads using `Arc`.
//! Readers work against an immutable snapshot of the metadata graph;
//! mutations are serialised by an internal lock and publish a fresh
//! snapshot atomically.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{info, instrument, warn};

use crate::assigner::{Assigner, HashAssigner};
use crate::config::HiveConfig;
use crate::connection::{ConnectionSource, DirectConnectionSource, NodeConnection};
use crate::directory::{Directory, DirectoryFacade};
use crate::error::{HiveError, NotFoundError, Result, StorageError, ValidationError};
use crate::lock::{require_semaphores_writable, require_writable, LockScope};
use crate::meta::{
    validate_entity_name, HiveSemaphore, KeySemaphore, Node, PartitionDimension, Resource,
    SecondaryIndex,
};
use crate::metrics::{HiveStatistics, StatisticsSnapshot};
use crate::storage::HiveStore;
use crate::sync::SyncDaemon;
use crate::types::{Access, KeyValue, NodeId, Status};

/// Immutable snapshot of the metadata graph.
///
/// Readers hold an `Arc` to one snapshot for the duration of an operation;
/// sync replaces the whole snapshot in one store, so a reader sees either
/// the old or the new complete graph, never a partial one.
pub(crate) struct HiveSnapshot {
    pub(crate) revision: u64,
    pub(crate) status: Status,
    pub(crate) dimensions: BTreeMap<String, PartitionDimension>,
}

impl HiveSnapshot {
    pub(crate) fn dimension(&self, name: &str) -> Result<&PartitionDimension> {
        self.dimensions
            .get(name)
            .ok_or_else(|| NotFoundError::dimension(name).into())
    }
}

fn state_poisoned() -> HiveError {
    StorageError::corrupted("hive state lock poisoned").into()
}

/// Shared state of one hive instance.
///
/// Held behind an `Arc` by the [`Hive`], its [`DirectoryFacade`]s, and
/// (weakly) by the sync daemon.
pub(crate) struct HiveCore {
    pub(crate) store: HiveStore,
    snapshot: RwLock<Arc<HiveSnapshot>>,
    directories: RwLock<HashMap<String, Arc<Directory>>>,
    /// Serialises metadata mutations: one writer at a time.
    mutation_lock: Mutex<()>,
    pub(crate) stats: Arc<HiveStatistics>,
    pub(crate) assigner: Box<dyn Assigner>,
    pub(crate) connections: Box<dyn ConnectionSource>,
}

impl HiveCore {
    /// Returns the current metadata snapshot.
    pub(crate) fn snapshot(&self) -> Result<Arc<HiveSnapshot>> {
        Ok(Arc::clone(&*self.snapshot.read().map_err(|_| state_poisoned())?))
    }

    /// Returns the directory of a dimension.
    pub(crate) fn directory(&self, dimension: &str) -> Result<Arc<Directory>> {
        self.directories
            .read()
            .map_err(|_| state_poisoned())?
            .get(dimension)
            .cloned()
            .ok_or_else(|| NotFoundError::dimension(dimension).into())
    }

    /// Compares the persisted revision against the cached one and reloads
    /// the whole graph on divergence.
    ///
    /// Returns true if a reload happened.
    pub(crate) fn force_synchronize(&self) -> Result<bool> {
        let persisted = self
            .store
            .semaphore()
            .read()?
            .ok_or_else(|| HiveError::MetadataMissing(self.store.uri().to_string()))?;

        if self.snapshot()?.revision == persisted.revision {
            return Ok(false);
        }

        let (semaphore, dimensions) = self.store.load_graph()?;
        self.install_graph(semaphore, dimensions)?;
        Ok(true)
    }

    /// Publishes a freshly loaded graph: rebuilds the directory set, then
    /// swaps the snapshot atomically.
    pub(crate) fn install_graph(
        &self,
        semaphore: HiveSemaphore,
        dimensions: BTreeMap<String, PartitionDimension>,
    ) -> Result<()> {
        let mut directories = HashMap::with_capacity(dimensions.len());
        for (name, dimension) in &dimensions {
            let db = self.store.directory_database(dimension.index_uri.as_deref())?;
            directories.insert(
                name.clone(),
                Arc::new(Directory::new(name.clone(), db, Arc::clone(&self.stats))),
            );
        }

        *self.directories.write().map_err(|_| state_poisoned())? = directories;
        *self.snapshot.write().map_err(|_| state_poisoned())? = Arc::new(HiveSnapshot {
            revision: semaphore.revision,
            status: semaphore.status,
            dimensions,
        });
        Ok(())
    }

    /// Starts a metadata mutation: serialises against other writers and
    /// refuses if the hive is read-only.
    ///
    /// The returned guard must be held until the mutation has been
    /// committed and synced.
    fn begin_mutation(&self) -> Result<(MutexGuard<'_, ()>, Arc<HiveSnapshot>)> {
        let guard = self.mutation_lock.lock().map_err(|_| state_poisoned())?;
        let snapshot = self.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        Ok((guard, snapshot))
    }

    /// Finishes a metadata mutation: bumps the persisted revision once and
    /// reconciles the in-memory graph.
    fn commit_mutation(&self) -> Result<()> {
        self.store.semaphore().increment()?;
        self.force_synchronize()?;
        Ok(())
    }
}

/// The main hive handle.
///
/// Create one with [`Hive::create`] (installs the metadata schema) or
/// [`Hive::load`] (opens an installed hive), and release it with
/// [`Hive::close`]. Cooperating in-process instances over the same hive
/// database are opened with [`Hive::attach`].
pub struct Hive {
    core: Arc<HiveCore>,
    daemon: Option<SyncDaemon>,
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.core.snapshot().ok();
        f.debug_struct("Hive")
            .field("uri", &self.core.store.uri())
            .field("revision", &snapshot.as_ref().map(|s| s.revision))
            .field("dimensions", &snapshot.as_ref().map(|s| s.dimensions.len()))
            .finish_non_exhaustive()
    }
}

impl Hive {
    /// Installs the hive metadata schema at `config.uri` and opens it.
    ///
    /// Creating an already installed hive leaves its contents untouched.
    #[instrument(skip(config), fields(uri = %config.uri))]
    pub fn create(config: HiveConfig) -> Result<Self> {
        config.validate()?;
        let store = HiveStore::create(&config.uri)?;
        Self::build(store, config, Box::new(HashAssigner), Box::new(DirectConnectionSource))
    }

    /// Opens an installed hive.
    ///
    /// # Errors
    ///
    /// Fails with [`HiveError::MetadataMissing`] if the metadata schema has
    /// never been installed at the URI.
    #[instrument(skip(config), fields(uri = %config.uri))]
    pub fn load(config: HiveConfig) -> Result<Self> {
        config.validate()?;
        let store = HiveStore::open(&config.uri)?;
        Self::build(store, config, Box::new(HashAssigner), Box::new(DirectConnectionSource))
    }

    /// Opens an installed hive with a custom assigner and connection source.
    pub fn load_with(
        config: HiveConfig,
        assigner: Box<dyn Assigner>,
        connections: Box<dyn ConnectionSource>,
    ) -> Result<Self> {
        config.validate()?;
        let store = HiveStore::open(&config.uri)?;
        Self::build(store, config, assigner, connections)
    }

    /// Opens a second in-process instance over an already open hive store.
    ///
    /// The embedded storage engine allows one open handle per file per
    /// process, so cooperating instances in the same process share the
    /// store. Each instance keeps its own cached graph, revision, and sync
    /// daemon, which is the in-process equivalent of a second cooperating
    /// process.
    pub fn attach(store: HiveStore, config: HiveConfig) -> Result<Self> {
        config.validate()?;
        if store.semaphore().read()?.is_none() {
            return Err(HiveError::MetadataMissing(store.uri().to_string()));
        }
        Self::build(store, config, Box::new(HashAssigner), Box::new(DirectConnectionSource))
    }

    fn build(
        store: HiveStore,
        config: HiveConfig,
        assigner: Box<dyn Assigner>,
        connections: Box<dyn ConnectionSource>,
    ) -> Result<Self> {
        let stats = Arc::new(HiveStatistics::new(config.performance_monitoring));
        let (semaphore, dimensions) = store.load_graph()?;

        let core = Arc::new(HiveCore {
            store,
            snapshot: RwLock::new(Arc::new(HiveSnapshot {
                revision: semaphore.revision,
                status: semaphore.status,
                dimensions: BTreeMap::new(),
            })),
            directories: RwLock::new(HashMap::new()),
            mutation_lock: Mutex::new(()),
            stats,
            assigner,
            connections,
        });
        core.install_graph(semaphore, dimensions)?;

        let daemon = if config.sync_period.is_zero() {
            None
        } else {
            Some(SyncDaemon::spawn(Arc::downgrade(&core), config.sync_period)?)
        };

        info!(
            uri = %core.store.uri(),
            revision = semaphore.revision,
            dimensions = core.snapshot()?.dimensions.len(),
            "Hive opened"
        );

        Ok(Self { core, daemon })
    }

    /// Closes the hive, stopping the sync daemon.
    ///
    /// Pending writes are already durable (every operation commits its own
    /// storage transaction); closing releases the instance's handles.
    pub fn close(mut self) -> Result<()> {
        self.daemon.take();
        info!(uri = %self.core.store.uri(), "Hive closed");
        Ok(())
    }

    /// Returns the store this hive is attached to, for use with
    /// [`Hive::attach`].
    pub fn store(&self) -> &HiveStore {
        &self.core.store
    }

    /// The cached metadata revision.
    pub fn revision(&self) -> Result<u64> {
        Ok(self.core.snapshot()?.revision)
    }

    /// The cached hive-wide status.
    pub fn hive_status(&self) -> Result<Status> {
        Ok(self.core.snapshot()?.status)
    }

    /// Returns a dimension by name from the cached graph.
    pub fn dimension(&self, name: &str) -> Result<PartitionDimension> {
        Ok(self.core.snapshot()?.dimension(name)?.clone())
    }

    /// Returns all dimensions from the cached graph.
    pub fn dimensions(&self) -> Result<Vec<PartitionDimension>> {
        Ok(self.core.snapshot()?.dimensions.values().cloned().collect())
    }

    /// Returns a point-in-time copy of the performance counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.core.stats.snapshot()
    }

    /// Returns the lock-enforcing directory facade of a dimension.
    pub fn directory(&self, dimension: &str) -> Result<DirectoryFacade> {
        // Resolve now so callers learn about unknown dimensions early
        self.core.snapshot()?.dimension(dimension)?;
        Ok(DirectoryFacade::new(Arc::clone(&self.core), dimension))
    }

    /// Reconciles the cached graph against the persisted revision.
    ///
    /// Returns true if the graph was reloaded. Called by the sync daemon on
    /// every tick; exposed for embedders that disable the daemon.
    pub fn force_synchronize(&self) -> Result<bool> {
        self.core.force_synchronize()
    }

    // =========================================================================
    // Metadata CRUD: partition dimensions
    // =========================================================================

    /// Adds a partition dimension, including any resources, secondary
    /// indexes, and nodes it already carries.
    ///
    /// Returns the persisted dimension with gateway-assigned ids.
    #[instrument(skip(self, dimension), fields(name = %dimension.name))]
    pub fn add_partition_dimension(
        &self,
        dimension: PartitionDimension,
    ) -> Result<PartitionDimension> {
        let (_guard, _snapshot) = self.core.begin_mutation()?;

        validate_entity_name("dimension", &dimension.name)?;
        validate_children(&dimension)?;

        let mut dimension = dimension;
        for resource in &mut dimension.resources {
            resource.dimension = dimension.name.clone();
            for index in &mut resource.secondary_indexes {
                index.resource = resource.name.clone();
            }
        }
        for node in &mut dimension.nodes {
            node.dimension = dimension.name.clone();
        }

        let dimension_id = self.core.store.dimensions().create(&dimension)?;
        for node in &dimension.nodes {
            self.core.store.nodes().create(dimension_id, node)?;
        }
        for resource in &dimension.resources {
            let resource_id = self.core.store.resources().create(dimension_id, resource)?;
            for index in &resource.secondary_indexes {
                self.core.store.secondary_indexes().create(resource_id, index)?;
            }
        }

        self.core.commit_mutation()?;
        info!(name = %dimension.name, "Partition dimension added");
        self.dimension(&dimension.name)
    }

    /// Rewrites a dimension's own attributes (children are untouched).
    #[instrument(skip(self, dimension), fields(name = %dimension.name))]
    pub fn update_partition_dimension(&self, dimension: &PartitionDimension) -> Result<()> {
        let (_guard, _snapshot) = self.core.begin_mutation()?;
        validate_entity_name("dimension", &dimension.name)?;

        self.core.store.dimensions().update(dimension)?;
        self.core.commit_mutation()?;
        info!(name = %dimension.name, "Partition dimension updated");
        Ok(())
    }

    /// Deletes a dimension, cascading over its resources, secondary
    /// indexes, nodes, and directory tables.
    #[instrument(skip(self))]
    pub fn delete_partition_dimension(&self, name: &str) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let dimension = snapshot.dimension(name)?;

        for resource in &dimension.resources {
            for index in &resource.secondary_indexes {
                self.core.store.secondary_indexes().delete(index.id)?;
            }
            self.core.store.resources().delete(resource.id)?;
        }
        for node in &dimension.nodes {
            self.core.store.nodes().delete(node.id)?;
        }
        self.core.store.dimensions().delete(dimension.id)?;

        self.drop_directory_tables(dimension, None)?;
        self.core.commit_mutation()?;
        info!(name, "Partition dimension deleted");
        Ok(())
    }

    // =========================================================================
    // Metadata CRUD: resources
    // =========================================================================

    /// Adds a resource (and any secondary indexes it carries) to a
    /// dimension.
    ///
    /// Returns the persisted resource with gateway-assigned ids.
    #[instrument(skip(self, resource), fields(name = %resource.name))]
    pub fn add_resource(&self, dimension: &str, resource: Resource) -> Result<Resource> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;

        validate_entity_name("resource", &resource.name)?;
        for index in &resource.secondary_indexes {
            validate_entity_name("secondary index", &index.name)?;
        }

        let mut resource = resource;
        resource.dimension = owner.name.clone();
        for index in &mut resource.secondary_indexes {
            index.resource = resource.name.clone();
        }

        let resource_id = self.core.store.resources().create(owner.id, &resource)?;
        for index in &resource.secondary_indexes {
            self.core.store.secondary_indexes().create(resource_id, index)?;
        }

        self.core.commit_mutation()?;
        info!(dimension, name = %resource.name, "Resource added");

        let name = resource.name;
        Ok(self
            .core
            .snapshot()?
            .dimension(dimension)?
            .resource(&name)
            .ok_or_else(|| NotFoundError::resource(&name))?
            .clone())
    }

    /// Rewrites a resource's own attributes.
    #[instrument(skip(self, resource), fields(name = %resource.name))]
    pub fn update_resource(&self, dimension: &str, resource: &Resource) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        validate_entity_name("resource", &resource.name)?;

        self.core.store.resources().update(owner.id, resource)?;
        self.core.commit_mutation()?;
        info!(dimension, name = %resource.name, "Resource updated");
        Ok(())
    }

    /// Deletes a resource, cascading over its secondary indexes and
    /// directory tables.
    #[instrument(skip(self))]
    pub fn delete_resource(&self, dimension: &str, name: &str) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        let resource = owner
            .resource(name)
            .ok_or_else(|| NotFoundError::resource(name))?;

        for index in &resource.secondary_indexes {
            self.core.store.secondary_indexes().delete(index.id)?;
        }
        self.core.store.resources().delete(resource.id)?;

        self.drop_directory_tables(owner, Some(resource))?;
        self.core.commit_mutation()?;
        info!(dimension, name, "Resource deleted");
        Ok(())
    }

    // =========================================================================
    // Metadata CRUD: secondary indexes
    // =========================================================================

    /// Adds a secondary index to a resource.
    ///
    /// Returns the persisted index with its gateway-assigned id.
    #[instrument(skip(self, index), fields(name = %index.name))]
    pub fn add_secondary_index(
        &self,
        dimension: &str,
        resource: &str,
        index: SecondaryIndex,
    ) -> Result<SecondaryIndex> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        let parent = owner
            .resource(resource)
            .ok_or_else(|| NotFoundError::resource(resource))?;

        validate_entity_name("secondary index", &index.name)?;

        let mut index = index;
        index.resource = parent.name.clone();

        self.core.store.secondary_indexes().create(parent.id, &index)?;
        self.core.commit_mutation()?;
        info!(dimension, resource, name = %index.name, "Secondary index added");

        let name = index.name;
        Ok(self
            .core
            .snapshot()?
            .dimension(dimension)?
            .resource(resource)
            .and_then(|r| r.secondary_index(&name))
            .ok_or_else(|| NotFoundError::secondary_index(&name))?
            .clone())
    }

    /// Rewrites a secondary index's attributes.
    #[instrument(skip(self, index), fields(name = %index.name))]
    pub fn update_secondary_index(
        &self,
        dimension: &str,
        resource: &str,
        index: &SecondaryIndex,
    ) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let parent = snapshot
            .dimension(dimension)?
            .resource(resource)
            .ok_or_else(|| NotFoundError::resource(resource))?;
        validate_entity_name("secondary index", &index.name)?;

        self.core.store.secondary_indexes().update(parent.id, index)?;
        self.core.commit_mutation()?;
        Ok(())
    }

    /// Deletes a secondary index and drops its directory table.
    #[instrument(skip(self))]
    pub fn delete_secondary_index(
        &self,
        dimension: &str,
        resource: &str,
        name: &str,
    ) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        let parent = owner
            .resource(resource)
            .ok_or_else(|| NotFoundError::resource(resource))?;
        let index = parent
            .secondary_index(name)
            .ok_or_else(|| NotFoundError::secondary_index(name))?;

        self.core.store.secondary_indexes().delete(index.id)?;

        let db = self.core.store.directory_database(owner.index_uri.as_deref())?;
        let txn = db.begin_write().map_err(StorageError::from)?;
        let table = crate::directory::schema::secondary_index_table(&owner.name, &parent.name, name);
        let _ = txn.delete_multimap_table(crate::directory::schema::secondary_def(&table))?;
        txn.commit().map_err(StorageError::from)?;

        self.core.commit_mutation()?;
        info!(dimension, resource, name, "Secondary index deleted");
        Ok(())
    }

    // =========================================================================
    // Metadata CRUD: nodes
    // =========================================================================

    /// Adds a node to a dimension.
    ///
    /// Returns the persisted node with its gateway-assigned id.
    #[instrument(skip(self, node), fields(name = %node.name))]
    pub fn add_node(&self, dimension: &str, node: Node) -> Result<Node> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;

        validate_entity_name("node", &node.name)?;

        let mut node = node;
        node.dimension = owner.name.clone();

        self.core.store.nodes().create(owner.id, &node)?;
        self.core.commit_mutation()?;
        info!(dimension, name = %node.name, "Node added");

        let name = node.name;
        Ok(self
            .core
            .snapshot()?
            .dimension(dimension)?
            .node(&name)
            .ok_or_else(|| NotFoundError::node(&name))?
            .clone())
    }

    /// Rewrites a node's attributes (URI, status, name).
    #[instrument(skip(self, node), fields(name = %node.name))]
    pub fn update_node(&self, dimension: &str, node: &Node) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        validate_entity_name("node", &node.name)?;

        self.core.store.nodes().update(owner.id, node)?;
        self.core.commit_mutation()?;
        info!(dimension, name = %node.name, status = %node.status, "Node updated");
        Ok(())
    }

    /// Deletes a node.
    ///
    /// Directory rows pointing at the node are left in place; keys that
    /// lived only on this node become unreachable until repointed.
    #[instrument(skip(self))]
    pub fn delete_node(&self, dimension: &str, name: &str) -> Result<()> {
        let (_guard, snapshot) = self.core.begin_mutation()?;
        let owner = snapshot.dimension(dimension)?;
        let node = owner.node(name).ok_or_else(|| NotFoundError::node(name))?;

        self.core.store.nodes().delete(node.id)?;
        self.core.commit_mutation()?;
        info!(dimension, name, "Node deleted");
        Ok(())
    }

    // =========================================================================
    // Status control
    // =========================================================================

    /// Freezes or thaws the whole hive.
    ///
    /// This is the single writer to the hive semaphore's status flag. The
    /// write bumps the revision so cooperating instances pick the change up
    /// on their next sync; it is permitted regardless of the current status
    /// (a read-only hive must stay unfreezable).
    #[instrument(skip(self))]
    pub fn update_hive_status(&self, status: Status) -> Result<()> {
        let _guard = self.core.mutation_lock.lock().map_err(|_| state_poisoned())?;
        self.core.store.semaphore().update_status(status)?;
        self.core.force_synchronize()?;
        info!(status = %status, "Hive status updated");
        Ok(())
    }

    /// Freezes or thaws one node, routing through [`Hive::update_node`].
    pub fn update_node_status(&self, dimension: &str, node: &str, status: Status) -> Result<()> {
        let mut updated = self
            .core
            .snapshot()?
            .dimension(dimension)?
            .node(node)
            .ok_or_else(|| NotFoundError::node(node))?
            .clone();
        updated.status = status;
        self.update_node(dimension, &updated)
    }

    // =========================================================================
    // Key CRUD (delegated to the lock-enforcing directory facade)
    // =========================================================================

    /// Routes a new partition key to a writable node and records it.
    ///
    /// Node choice is delegated to the [`Assigner`]; the chosen node is
    /// re-checked for writability before the directory insert.
    pub fn insert_primary_index_key(&self, dimension: &str, key: &KeyValue) -> Result<()> {
        self.directory(dimension)?.insert_primary_index_key(key)
    }

    /// Records a resource id under an existing partition key.
    ///
    /// For partitioning resources this is equivalent to
    /// [`Hive::insert_primary_index_key`] with the id as the key.
    pub fn insert_resource_id(
        &self,
        dimension: &str,
        resource: &str,
        id: &KeyValue,
        primary_key: &KeyValue,
    ) -> Result<()> {
        self.directory(dimension)?.insert_resource_id(resource, id, primary_key)
    }

    /// Records a secondary key → resource id association.
    pub fn insert_secondary_index_key(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        self.directory(dimension)?
            .insert_secondary_index_key(resource, index, secondary_key, resource_id)
    }

    /// Sets the per-key read-only flag on every semaphore of a key.
    pub fn update_primary_index_key_read_only(
        &self,
        dimension: &str,
        key: &KeyValue,
        read_only: bool,
    ) -> Result<()> {
        self.directory(dimension)?.update_primary_index_key_read_only(key, read_only)
    }

    /// Repoints a resource id at a different partition key.
    pub fn update_primary_index_key_of_resource_id(
        &self,
        dimension: &str,
        resource: &str,
        id: &KeyValue,
        new_primary_key: &KeyValue,
    ) -> Result<()> {
        self.directory(dimension)?
            .update_primary_index_key_of_resource_id(resource, id, new_primary_key)
    }

    /// Deletes a partition key, cascading over resource and secondary rows.
    pub fn delete_primary_index_key(&self, dimension: &str, key: &KeyValue) -> Result<()> {
        self.directory(dimension)?.delete_primary_index_key(key)
    }

    /// Deletes a resource id and the secondary rows pointing at it.
    pub fn delete_resource_id(
        &self,
        dimension: &str,
        resource: &str,
        id: &KeyValue,
    ) -> Result<()> {
        self.directory(dimension)?.delete_resource_id(resource, id)
    }

    /// Deletes one secondary key → resource id association.
    pub fn delete_secondary_index_key(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        self.directory(dimension)?
            .delete_secondary_index_key(resource, index, secondary_key, resource_id)
    }

    /// Returns the distinct node ids a partition key lives on.
    pub fn get_node_ids_of_primary_index_key(
        &self,
        dimension: &str,
        key: &KeyValue,
    ) -> Result<Vec<NodeId>> {
        self.directory(dimension)?.get_node_ids_of_primary_index_key(key)
    }

    /// Returns the distinct node ids reachable from a secondary key.
    pub fn get_node_ids_of_secondary_index_key(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<NodeId>> {
        self.directory(dimension)?
            .get_node_ids_of_secondary_index_key(resource, index, secondary_key)
    }

    /// Returns the partition key a resource id lives under.
    pub fn get_primary_index_key_of_resource_id(
        &self,
        dimension: &str,
        resource: &str,
        id: &KeyValue,
    ) -> Result<KeyValue> {
        self.directory(dimension)?.get_primary_index_key_of_resource_id(resource, id)
    }

    // =========================================================================
    // Connection acquisition
    // =========================================================================

    /// Opens a connection to the shard holding a partition key.
    ///
    /// For [`Access::ReadWrite`] the hive, the node, and every semaphore of
    /// the key must be writable. For [`Access::Read`] the connection is put
    /// into read-only mode and lock state is ignored.
    ///
    /// Any failure increments the connection-failure counter and is
    /// re-raised. The returned connection is owned by the caller.
    #[instrument(skip(self, key), fields(key = %key))]
    pub fn connection(
        &self,
        dimension: &str,
        key: &KeyValue,
        access: Access,
    ) -> Result<NodeConnection> {
        let attempt = self.try_connection(dimension, key, access);
        self.record_connection(access, attempt)
    }

    /// Opens a connection to a shard resolved through a secondary index key.
    ///
    /// A secondary key pointing at several partition keys resolves to the
    /// semaphore set union; the connection goes to the lowest node id.
    #[instrument(skip(self, secondary_key), fields(key = %secondary_key))]
    pub fn connection_by_secondary(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        access: Access,
    ) -> Result<NodeConnection> {
        let attempt =
            self.try_connection_by_secondary(dimension, resource, index, secondary_key, access);
        self.record_connection(access, attempt)
    }

    fn try_connection(
        &self,
        dimension: &str,
        key: &KeyValue,
        access: Access,
    ) -> Result<NodeConnection> {
        let snapshot = self.core.snapshot()?;
        let owner = snapshot.dimension(dimension)?;
        check_key_type(owner.key_type, key)?;

        let semaphores = self
            .core
            .directory(dimension)?
            .get_key_semaphores_of_primary_index_key(key)?;
        if semaphores.is_empty() {
            return Err(NotFoundError::primary_key(key).into());
        }

        self.route(&snapshot, owner, &semaphores, key, access)
    }

    fn try_connection_by_secondary(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        access: Access,
    ) -> Result<NodeConnection> {
        let snapshot = self.core.snapshot()?;
        let owner = snapshot.dimension(dimension)?;
        let parent = owner
            .resource(resource)
            .ok_or_else(|| NotFoundError::resource(resource))?;
        let idx = parent
            .secondary_index(index)
            .ok_or_else(|| NotFoundError::secondary_index(index))?;
        check_key_type(idx.column_type, secondary_key)?;

        let semaphores = self
            .core
            .directory(dimension)?
            .get_key_semaphores_of_secondary_index_key(parent, idx, secondary_key)?;
        if semaphores.is_empty() {
            return Err(NotFoundError::secondary_key(secondary_key).into());
        }

        self.route(&snapshot, owner, &semaphores, secondary_key, access)
    }

    fn route(
        &self,
        snapshot: &HiveSnapshot,
        dimension: &PartitionDimension,
        semaphores: &[KeySemaphore],
        key: &KeyValue,
        access: Access,
    ) -> Result<NodeConnection> {
        if access.is_write() {
            require_writable(LockScope::Hive, snapshot.status, "hive")?;
            require_semaphores_writable(semaphores, |s| dimension.node_by_id(s.node_id), key)?;
        }

        // Lowest node id for a deterministic choice among replicas
        let chosen = semaphores
            .iter()
            .min_by_key(|s| s.node_id)
            .ok_or_else(|| NotFoundError::primary_key(key))?;
        let node = dimension
            .node_by_id(chosen.node_id)
            .ok_or_else(|| NotFoundError::node(chosen.node_id))?;

        self.core.connections.open(node.id, &node.uri, !access.is_write())
    }

    fn record_connection(
        &self,
        access: Access,
        attempt: Result<NodeConnection>,
    ) -> Result<NodeConnection> {
        match attempt {
            Ok(connection) => {
                if access.is_write() {
                    self.core.stats.record_write_connection();
                } else {
                    self.core.stats.record_read_connection();
                }
                Ok(connection)
            }
            Err(e) => {
                self.core.stats.record_connection_failure();
                warn!(error = %e, "Connection acquisition failed");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Drops the directory tables of a whole dimension, or of one resource
    /// when `only` is given.
    fn drop_directory_tables(
        &self,
        dimension: &PartitionDimension,
        only: Option<&Resource>,
    ) -> Result<()> {
        use crate::directory::schema as ds;

        let db = self.core.store.directory_database(dimension.index_uri.as_deref())?;
        let txn = db.begin_write().map_err(StorageError::from)?;

        let resources: Vec<&Resource> = match only {
            Some(resource) => vec![resource],
            None => dimension.resources.iter().collect(),
        };
        for resource in resources {
            for index in &resource.secondary_indexes {
                let name = ds::secondary_index_table(&dimension.name, &resource.name, &index.name);
                let _ = txn.delete_multimap_table(ds::secondary_def(&name))?;
            }
            let name = ds::resource_index_table(&dimension.name, &resource.name);
            let _ = txn.delete_table(ds::resource_def(&name))?;
        }
        if only.is_none() {
            let name = ds::primary_index_table(&dimension.name);
            let _ = txn.delete_multimap_table(ds::primary_def(&name))?;
        }

        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

/// Checks a key value against a declared key type.
pub(crate) fn check_key_type(expected: crate::types::KeyType, value: &KeyValue) -> Result<()> {
    if expected.accepts(value) {
        Ok(())
    } else {
        Err(ValidationError::key_type_mismatch(expected, value.key_type()).into())
    }
}

/// Validates the names and in-set uniqueness of a new dimension's children.
fn validate_children(dimension: &PartitionDimension) -> Result<()> {
    for (i, resource) in dimension.resources.iter().enumerate() {
        validate_entity_name("resource", &resource.name)?;
        if dimension.resources[..i].iter().any(|r| r.name == resource.name) {
            return Err(HiveError::duplicate_name("resource", &resource.name, &dimension.name));
        }
        for (j, index) in resource.secondary_indexes.iter().enumerate() {
            validate_entity_name("secondary index", &index.name)?;
            if resource.secondary_indexes[..j].iter().any(|x| x.name == index.name) {
                return Err(HiveError::duplicate_name(
                    "secondary index",
                    &index.name,
                    &resource.name,
                ));
            }
        }
    }
    for (i, node) in dimension.nodes.iter().enumerate() {
        validate_entity_name("node", &node.name)?;
        if dimension.nodes[..i].iter().any(|n| n.name == node.name) {
            return Err(HiveError::duplicate_name("node", &node.name, &dimension.name));
        }
    }
    Ok(())
}
