//! Lock-enforcing, name-resolving view of a dimension's directory.
//!
//! The [`DirectoryFacade`] exposes the same operations as the raw
//! [`Directory`](super::Directory), but resolves entity names against the
//! current metadata snapshot and runs the lock engine on every mutating
//! call: hive status first, then the semaphores the directory returns for
//! the target key (and their nodes). Reads bypass the lock engine, as
//! read-only data stays readable.
//!
//! Obtained from [`Hive::directory`](crate::Hive::directory); the hive's
//! key CRUD methods are thin wrappers around it.

use std::sync::Arc;

use crate::error::{NotFoundError, Result, ValidationError};
use crate::hive::{check_key_type, HiveCore};
use crate::lock::{require_semaphores_writable, require_writable, LockScope};
use crate::meta::{KeySemaphore, PartitionDimension, Resource, SecondaryIndex};
use crate::types::{KeyValue, NodeId};

/// Per-dimension directory operations with lock enforcement.
pub struct DirectoryFacade {
    core: Arc<HiveCore>,
    dimension: String,
}

impl std::fmt::Debug for DirectoryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryFacade")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

fn resolve_resource<'a>(dimension: &'a PartitionDimension, name: &str) -> Result<&'a Resource> {
    dimension
        .resource(name)
        .ok_or_else(|| NotFoundError::resource(name).into())
}

fn resolve_index<'a>(resource: &'a Resource, name: &str) -> Result<&'a SecondaryIndex> {
    resource
        .secondary_index(name)
        .ok_or_else(|| NotFoundError::secondary_index(name).into())
}

impl DirectoryFacade {
    pub(crate) fn new(core: Arc<HiveCore>, dimension: &str) -> Self {
        Self {
            core,
            dimension: dimension.to_string(),
        }
    }

    /// The dimension this facade operates on.
    #[inline]
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Routes a new partition key to a writable node and records it.
    ///
    /// The assigner picks from the dimension's writable nodes; the chosen
    /// node is re-checked for writability before the directory insert.
    pub fn insert_primary_index_key(&self, key: &KeyValue) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        check_key_type(dimension.key_type, key)?;

        let writable = dimension.writable_nodes();
        let node = self.core.assigner.choose(&writable, key)?;
        require_writable(LockScope::Node, node.status, &node.name)?;

        self.core
            .directory(&self.dimension)?
            .insert_primary_index_key(node.id, key)
    }

    /// Records a resource id under an existing partition key.
    ///
    /// For partitioning resources the id *is* the partition key: the id
    /// must equal `primary_key` and the call routes to
    /// [`insert_primary_index_key`](Self::insert_primary_index_key).
    pub fn insert_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
        primary_key: &KeyValue,
    ) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        let dimension = snapshot.dimension(&self.dimension)?;
        let resource = resolve_resource(dimension, resource)?;
        check_key_type(resource.key_type, id)?;
        check_key_type(dimension.key_type, primary_key)?;

        if resource.is_partitioning {
            if id != primary_key {
                return Err(ValidationError::invalid_field(
                    "resource_id",
                    format!(
                        "ids of partitioning resource '{}' must equal their partition key",
                        resource.name
                    ),
                )
                .into());
            }
            return self.insert_primary_index_key(id);
        }

        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_primary_index_key(primary_key)?;
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), primary_key)?;

        directory.insert_resource_id(resource, id, primary_key)
    }

    /// Records a secondary key → resource id association.
    pub fn insert_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        let resource = resolve_resource(dimension, resource)?;
        let index = resolve_index(resource, index)?;
        check_key_type(index.column_type, secondary_key)?;
        check_key_type(resource.key_type, resource_id)?;

        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_resource_id(resource, resource_id)?;
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), resource_id)?;

        directory.insert_secondary_index_key(resource, index, secondary_key, resource_id)
    }

    // =========================================================================
    // Lookups (no lock enforcement)
    // =========================================================================

    /// Returns the semaphores of a partition key; empty means unknown.
    pub fn get_key_semaphores_of_primary_index_key(
        &self,
        key: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        self.core
            .directory(&self.dimension)?
            .get_key_semaphores_of_primary_index_key(key)
    }

    /// Returns the semaphores guarding a resource id.
    pub fn get_key_semaphores_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        self.core
            .directory(&self.dimension)?
            .get_key_semaphores_of_resource_id(resource, id)
    }

    /// Returns the semaphores guarding a secondary index key.
    pub fn get_key_semaphores_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        let index = resolve_index(resource, index)?;
        self.core
            .directory(&self.dimension)?
            .get_key_semaphores_of_secondary_index_key(resource, index, secondary_key)
    }

    /// Returns the distinct node ids a partition key lives on.
    pub fn get_node_ids_of_primary_index_key(&self, key: &KeyValue) -> Result<Vec<NodeId>> {
        self.core
            .directory(&self.dimension)?
            .get_node_ids_of_primary_index_key(key)
    }

    /// Returns the distinct node ids reachable from a secondary key.
    pub fn get_node_ids_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<NodeId>> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        let index = resolve_index(resource, index)?;
        self.core
            .directory(&self.dimension)?
            .get_node_ids_of_secondary_index_key(resource, index, secondary_key)
    }

    /// Returns the partition key a resource id lives under (identity for
    /// partitioning resources).
    pub fn get_primary_index_key_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
    ) -> Result<KeyValue> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        self.core
            .directory(&self.dimension)?
            .get_primary_index_key_of_resource_id(resource, id)
    }

    /// Returns the resource ids a secondary key points at.
    pub fn get_resource_ids_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        let index = resolve_index(resource, index)?;
        self.core
            .directory(&self.dimension)?
            .get_resource_ids_of_secondary_index_key(resource, index, secondary_key)
    }

    /// Returns true if the partition key has a primary index row.
    pub fn primary_index_key_exists(&self, key: &KeyValue) -> Result<bool> {
        self.core.directory(&self.dimension)?.primary_index_key_exists(key)
    }

    /// Returns true if the resource id has a directory row.
    pub fn resource_id_exists(&self, resource: &str, id: &KeyValue) -> Result<bool> {
        let snapshot = self.core.snapshot()?;
        let resource = resolve_resource(snapshot.dimension(&self.dimension)?, resource)?;
        self.core.directory(&self.dimension)?.resource_id_exists(resource, id)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Sets the per-key read-only flag on every semaphore of a key.
    ///
    /// The lock engine checks the hive and the key's nodes, but not the
    /// key's own semaphores: toggling the flag off must work on a key that
    /// is currently read-only.
    pub fn update_primary_index_key_read_only(
        &self,
        key: &KeyValue,
        read_only: bool,
    ) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        check_key_type(dimension.key_type, key)?;

        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_primary_index_key(key)?;
        if semaphores.is_empty() {
            return Err(NotFoundError::primary_key(key).into());
        }
        for semaphore in &semaphores {
            if let Some(node) = dimension.node_by_id(semaphore.node_id) {
                require_writable(LockScope::Node, node.status, &node.name)?;
            }
        }

        directory.update_primary_index_key_read_only(key, read_only)
    }

    /// Repoints a resource id at a different partition key.
    ///
    /// The destination key's semaphores must be writable.
    pub fn update_primary_index_key_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
        new_primary_key: &KeyValue,
    ) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        let resource = resolve_resource(dimension, resource)?;
        check_key_type(resource.key_type, id)?;
        check_key_type(dimension.key_type, new_primary_key)?;

        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_primary_index_key(new_primary_key)?;
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), new_primary_key)?;

        directory.update_primary_index_key_of_resource_id(resource, id, new_primary_key)
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Deletes a partition key and cascades over resource and secondary
    /// rows, in one storage transaction.
    pub fn delete_primary_index_key(&self, key: &KeyValue) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        check_key_type(dimension.key_type, key)?;

        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_primary_index_key(key)?;
        if semaphores.is_empty() {
            return Err(NotFoundError::primary_key(key).into());
        }
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), key)?;

        directory.delete_primary_index_key(&dimension.resources, key)
    }

    /// Deletes a resource id and the secondary rows pointing at it.
    ///
    /// For partitioning resources this routes to
    /// [`delete_primary_index_key`](Self::delete_primary_index_key),
    /// mirroring the insert equivalence.
    pub fn delete_resource_id(&self, resource: &str, id: &KeyValue) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        let dimension = snapshot.dimension(&self.dimension)?;
        let resource = resolve_resource(dimension, resource)?;
        check_key_type(resource.key_type, id)?;

        if resource.is_partitioning {
            return self.delete_primary_index_key(id);
        }

        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_resource_id(resource, id)?;
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), id)?;

        directory.delete_resource_id(resource, id)
    }

    /// Deletes one secondary key → resource id association.
    pub fn delete_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        let snapshot = self.core.snapshot()?;
        require_writable(LockScope::Hive, snapshot.status, "hive")?;
        let dimension = snapshot.dimension(&self.dimension)?;
        let resource = resolve_resource(dimension, resource)?;
        let index = resolve_index(resource, index)?;
        check_key_type(index.column_type, secondary_key)?;
        check_key_type(resource.key_type, resource_id)?;

        let directory = self.core.directory(&self.dimension)?;
        let semaphores = directory.get_key_semaphores_of_resource_id(resource, resource_id)?;
        require_semaphores_writable(&semaphores, |s| dimension.node_by_id(s.node_id), resource_id)?;

        directory.delete_secondary_index_key(resource, index, secondary_key, resource_id)
    }
}
