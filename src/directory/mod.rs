//! Per-dimension key-routing directory.
//!
//! The [`Directory`] owns the persisted key→node and key→key maps of one
//! partition dimension: the primary index (partition key → node
//! semaphores), the resource indexes (resource id → partition key), and the
//! secondary indexes (attribute value → resource ids).
//!
//! Directory operations are mechanical: they never consult the lock
//! engine. Writability enforcement and name resolution live in
//! [`DirectoryFacade`](facade::DirectoryFacade) and the hive facade.

pub mod facade;
pub mod schema;

pub use facade::DirectoryFacade;

use std::sync::Arc;

use redb::{Database, ReadableMultimapTable, ReadableTable, WriteTransaction};
use tracing::debug;

use self::schema::{
    primary_def, primary_index_table, resource_def, resource_index_table, secondary_def,
    secondary_index_table, PrimaryIndexEntry, ResourceIndexEntry, SecondaryIndexEntry,
};
use crate::error::{HiveError, NotFoundError, Result, StorageError, ValidationError};
use crate::meta::{KeySemaphore, Resource, SecondaryIndex};
use crate::metrics::HiveStatistics;
use crate::types::{KeyValue, NodeId, Timestamp};

/// Key-routing tables of one partition dimension.
///
/// Cheap to clone-by-`Arc`; the hive keeps one per dimension and swaps the
/// set during sync.
pub struct Directory {
    dimension: String,
    db: Arc<Database>,
    stats: Arc<HiveStatistics>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl Directory {
    /// Creates the directory for `dimension` over the given database.
    pub(crate) fn new(
        dimension: impl Into<String>,
        db: Arc<Database>,
        stats: Arc<HiveStatistics>,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            db,
            stats,
        }
    }

    /// The dimension this directory belongs to.
    #[inline]
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Adds a primary index row `(key → node, writable)`.
    ///
    /// # Errors
    ///
    /// Fails with [`HiveError::DuplicateKey`] if the key already has a row.
    pub fn insert_primary_index_key(&self, node_id: NodeId, key: &KeyValue) -> Result<()> {
        let key_bytes = key.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let name = primary_index_table(&self.dimension);
            let mut table = txn.open_multimap_table(primary_def(&name))?;

            let exists = {
                let mut values = table.get(key_bytes.as_slice())?;
                values.next().is_some()
            };
            if exists {
                return Err(HiveError::DuplicateKey(key.to_string()));
            }

            let entry = PrimaryIndexEntry {
                node_id: node_id.0,
                read_only: false,
                last_updated: Timestamp::now().as_millis(),
            };
            table.insert(key_bytes.as_slice(), bincode::serialize(&entry)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        debug!(dimension = %self.dimension, key = %key, node = %node_id, "Primary index key inserted");
        Ok(())
    }

    /// Adds a resource index row `(resource id → partition key)`.
    ///
    /// A no-op for partitioning resources: their ids *are* partition keys
    /// and never get resource rows.
    ///
    /// # Errors
    ///
    /// Fails with [`HiveError::MissingParent`] if `primary_key` has no
    /// primary index row.
    pub fn insert_resource_id(
        &self,
        resource: &Resource,
        id: &KeyValue,
        primary_key: &KeyValue,
    ) -> Result<()> {
        if resource.is_partitioning {
            return Ok(());
        }

        let id_bytes = id.to_canonical_bytes();
        let key_bytes = primary_key.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            self.require_primary_row(&txn, &key_bytes, primary_key)?;

            let name = resource_index_table(&self.dimension, &resource.name);
            let mut table = txn.open_table(resource_def(&name))?;
            let entry = ResourceIndexEntry {
                primary_key: key_bytes,
                last_updated: Timestamp::now().as_millis(),
            };
            table.insert(id_bytes.as_slice(), bincode::serialize(&entry)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        debug!(dimension = %self.dimension, resource = %resource.name, id = %id, "Resource id inserted");
        Ok(())
    }

    /// Adds a secondary index row `(secondary key → resource id)`.
    ///
    /// Re-inserting an existing pair refreshes its `last_updated` stamp.
    ///
    /// # Errors
    ///
    /// Fails with [`HiveError::MissingParent`] if `resource_id` is unknown
    /// (no resource row, or for partitioning resources no primary row).
    pub fn insert_secondary_index_key(
        &self,
        resource: &Resource,
        index: &SecondaryIndex,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        let key_bytes = secondary_key.to_canonical_bytes();
        let id_bytes = resource_id.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            if resource.is_partitioning {
                match self.require_primary_row(&txn, &id_bytes, resource_id) {
                    Ok(()) => {}
                    Err(HiveError::MissingParent(_)) => {
                        return Err(missing_resource_id(resource, resource_id));
                    }
                    Err(e) => return Err(e),
                }
            } else {
                let name = resource_index_table(&self.dimension, &resource.name);
                let table = txn.open_table(resource_def(&name))?;
                if table.get(id_bytes.as_slice())?.is_none() {
                    return Err(missing_resource_id(resource, resource_id));
                }
            }

            let name = secondary_index_table(&self.dimension, &resource.name, &index.name);
            let mut table = txn.open_multimap_table(secondary_def(&name))?;

            // Refresh rather than duplicate an existing pair
            let stale: Vec<Vec<u8>> = {
                let mut stale = Vec::new();
                for value in table.get(key_bytes.as_slice())? {
                    let value = value?;
                    let entry: SecondaryIndexEntry = bincode::deserialize(value.value())?;
                    if entry.resource_id == id_bytes {
                        stale.push(value.value().to_vec());
                    }
                }
                stale
            };
            for value in stale {
                table.remove(key_bytes.as_slice(), value.as_slice())?;
            }

            let entry = SecondaryIndexEntry {
                resource_id: id_bytes,
                last_updated: Timestamp::now().as_millis(),
            };
            table.insert(key_bytes.as_slice(), bincode::serialize(&entry)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns the semaphores of a partition key, one per node it lives on.
    ///
    /// An empty set signals an unknown key.
    pub fn get_key_semaphores_of_primary_index_key(
        &self,
        key: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        self.stats.record_directory_read();
        let entries = self.read_primary_entries(&key.to_canonical_bytes())?;
        Ok(entries.iter().map(PrimaryIndexEntry::semaphore).collect())
    }

    /// Returns the semaphores guarding a resource id.
    ///
    /// For partitioning resources this defers to the primary lookup with
    /// the id as the partition key; otherwise it joins resource → primary
    /// → semaphores.
    pub fn get_key_semaphores_of_resource_id(
        &self,
        resource: &Resource,
        id: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        if resource.is_partitioning {
            return self.get_key_semaphores_of_primary_index_key(id);
        }

        self.stats.record_directory_read();
        match self.read_resource_entry(resource, &id.to_canonical_bytes())? {
            Some(entry) => {
                let entries = self.read_primary_entries(&entry.primary_key)?;
                Ok(entries.iter().map(PrimaryIndexEntry::semaphore).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Returns the semaphores guarding a secondary index key.
    ///
    /// The set is the union over every resource id the key points at, so a
    /// secondary key spread over several partition keys yields several
    /// semaphores.
    pub fn get_key_semaphores_of_secondary_index_key(
        &self,
        resource: &Resource,
        index: &SecondaryIndex,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        let resource_ids = self.get_resource_ids_of_secondary_index_key(resource, index, secondary_key)?;

        let mut semaphores: Vec<KeySemaphore> = Vec::new();
        for id in &resource_ids {
            for semaphore in self.get_key_semaphores_of_resource_id(resource, id)? {
                if !semaphores.contains(&semaphore) {
                    semaphores.push(semaphore);
                }
            }
        }
        semaphores.sort_by_key(|s| s.node_id);
        Ok(semaphores)
    }

    /// Returns the distinct node ids a partition key lives on.
    pub fn get_node_ids_of_primary_index_key(&self, key: &KeyValue) -> Result<Vec<NodeId>> {
        let semaphores = self.get_key_semaphores_of_primary_index_key(key)?;
        Ok(distinct_node_ids(&semaphores))
    }

    /// Returns the distinct node ids reachable from a secondary index key.
    pub fn get_node_ids_of_secondary_index_key(
        &self,
        resource: &Resource,
        index: &SecondaryIndex,
        secondary_key: &KeyValue,
    ) -> Result<Vec<NodeId>> {
        let semaphores =
            self.get_key_semaphores_of_secondary_index_key(resource, index, secondary_key)?;
        Ok(distinct_node_ids(&semaphores))
    }

    /// Returns the partition key a resource id lives under.
    ///
    /// The identity function for partitioning resources.
    ///
    /// # Errors
    ///
    /// Fails with [`NotFoundError::ResourceId`] if the id has no row.
    pub fn get_primary_index_key_of_resource_id(
        &self,
        resource: &Resource,
        id: &KeyValue,
    ) -> Result<KeyValue> {
        if resource.is_partitioning {
            return Ok(id.clone());
        }

        self.stats.record_directory_read();
        let entry = self
            .read_resource_entry(resource, &id.to_canonical_bytes())?
            .ok_or_else(|| missing_resource_id_not_found(resource, id))?;
        KeyValue::from_canonical_bytes(&entry.primary_key).ok_or_else(|| {
            StorageError::corrupted(format!(
                "resource index row for {} '{}' holds an undecodable partition key",
                resource.name, id
            ))
            .into()
        })
    }

    /// Returns the resource ids a secondary key points at.
    pub fn get_resource_ids_of_secondary_index_key(
        &self,
        resource: &Resource,
        index: &SecondaryIndex,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        self.stats.record_directory_read();

        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let name = secondary_index_table(&self.dimension, &resource.name, &index.name);
        let table = match txn.open_multimap_table(secondary_def(&name)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        let mut ids = Vec::new();
        for value in table.get(secondary_key.to_canonical_bytes().as_slice())? {
            let value = value?;
            let entry: SecondaryIndexEntry = bincode::deserialize(value.value())?;
            let id = KeyValue::from_canonical_bytes(&entry.resource_id).ok_or_else(|| {
                StorageError::corrupted(format!(
                    "secondary index row in '{}' holds an undecodable resource id",
                    name
                ))
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Returns true if the partition key has a primary index row.
    pub fn primary_index_key_exists(&self, key: &KeyValue) -> Result<bool> {
        self.stats.record_directory_read();
        Ok(!self.read_primary_entries(&key.to_canonical_bytes())?.is_empty())
    }

    /// Returns true if the resource id has a row (or, for partitioning
    /// resources, a primary index row).
    pub fn resource_id_exists(&self, resource: &Resource, id: &KeyValue) -> Result<bool> {
        if resource.is_partitioning {
            return self.primary_index_key_exists(id);
        }
        self.stats.record_directory_read();
        Ok(self
            .read_resource_entry(resource, &id.to_canonical_bytes())?
            .is_some())
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Sets the read-only flag on every semaphore of a partition key.
    ///
    /// # Errors
    ///
    /// Fails with [`NotFoundError::PrimaryKey`] if the key has no row.
    pub fn update_primary_index_key_read_only(
        &self,
        key: &KeyValue,
        read_only: bool,
    ) -> Result<()> {
        let key_bytes = key.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let name = primary_index_table(&self.dimension);
            let mut table = txn.open_multimap_table(primary_def(&name))?;

            let current: Vec<PrimaryIndexEntry> = {
                let mut current = Vec::new();
                for value in table.get(key_bytes.as_slice())? {
                    let value = value?;
                    current.push(bincode::deserialize(value.value())?);
                }
                current
            };
            if current.is_empty() {
                return Err(NotFoundError::primary_key(key).into());
            }

            let _ = table.remove_all(key_bytes.as_slice())?;
            for entry in current {
                let updated = PrimaryIndexEntry {
                    node_id: entry.node_id,
                    read_only,
                    last_updated: Timestamp::now().as_millis(),
                };
                table.insert(key_bytes.as_slice(), bincode::serialize(&updated)?.as_slice())?;
            }
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        debug!(dimension = %self.dimension, key = %key, read_only, "Primary index key flag updated");
        Ok(())
    }

    /// Repoints a resource id at a different partition key.
    ///
    /// # Errors
    ///
    /// - [`HiveError::Validation`] for partitioning resources, whose ids
    ///   cannot be repointed
    /// - [`HiveError::MissingParent`] if the new key has no primary row
    /// - [`NotFoundError::ResourceId`] if the id has no row
    pub fn update_primary_index_key_of_resource_id(
        &self,
        resource: &Resource,
        id: &KeyValue,
        new_primary_key: &KeyValue,
    ) -> Result<()> {
        if resource.is_partitioning {
            return Err(ValidationError::invalid_field(
                "resource",
                format!("ids of partitioning resource '{}' are partition keys and cannot be repointed", resource.name),
            )
            .into());
        }

        let id_bytes = id.to_canonical_bytes();
        let key_bytes = new_primary_key.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            self.require_primary_row(&txn, &key_bytes, new_primary_key)?;

            let name = resource_index_table(&self.dimension, &resource.name);
            let mut table = txn.open_table(resource_def(&name))?;
            if table.get(id_bytes.as_slice())?.is_none() {
                return Err(missing_resource_id_not_found(resource, id));
            }

            let entry = ResourceIndexEntry {
                primary_key: key_bytes,
                last_updated: Timestamp::now().as_millis(),
            };
            table.insert(id_bytes.as_slice(), bincode::serialize(&entry)?.as_slice())?;
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        Ok(())
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Removes a partition key and cascades over all resource and secondary
    /// rows that resolve to it, in a single storage transaction.
    ///
    /// `resources` is the dimension's resource set from the current
    /// metadata snapshot; the cascade walks every resource index and every
    /// secondary index under it.
    ///
    /// # Errors
    ///
    /// Fails with [`NotFoundError::PrimaryKey`] if the key has no row.
    pub fn delete_primary_index_key(&self, resources: &[Resource], key: &KeyValue) -> Result<()> {
        let key_bytes = key.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let name = primary_index_table(&self.dimension);
            let mut table = txn.open_multimap_table(primary_def(&name))?;
            let exists = {
                let mut values = table.get(key_bytes.as_slice())?;
                values.next().is_some()
            };
            if !exists {
                return Err(NotFoundError::primary_key(key).into());
            }
            let _ = table.remove_all(key_bytes.as_slice())?;
        }

        for resource in resources {
            if resource.is_partitioning {
                // Secondary rows of partitioning resources reference the
                // partition key directly.
                for index in &resource.secondary_indexes {
                    let name =
                        secondary_index_table(&self.dimension, &resource.name, &index.name);
                    purge_secondary_rows(&txn, &name, &key_bytes)?;
                }
                continue;
            }

            let name = resource_index_table(&self.dimension, &resource.name);
            let doomed: Vec<Vec<u8>> = {
                let mut table = txn.open_table(resource_def(&name))?;
                let doomed = {
                    let mut doomed = Vec::new();
                    for entry in table.iter()? {
                        let (row_key, value) = entry?;
                        let row: ResourceIndexEntry = bincode::deserialize(value.value())?;
                        if row.primary_key == key_bytes {
                            doomed.push(row_key.value().to_vec());
                        }
                    }
                    doomed
                };
                for id in &doomed {
                    table.remove(id.as_slice())?;
                }
                doomed
            };

            for index in &resource.secondary_indexes {
                let name = secondary_index_table(&self.dimension, &resource.name, &index.name);
                for id in &doomed {
                    purge_secondary_rows(&txn, &name, id)?;
                }
            }
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        debug!(dimension = %self.dimension, key = %key, "Primary index key deleted");
        Ok(())
    }

    /// Removes a resource id row and the secondary rows pointing at it.
    ///
    /// A no-op for partitioning resources (the facade routes those to
    /// [`delete_primary_index_key`](Self::delete_primary_index_key)).
    ///
    /// # Errors
    ///
    /// Fails with [`NotFoundError::ResourceId`] if the id has no row.
    pub fn delete_resource_id(&self, resource: &Resource, id: &KeyValue) -> Result<()> {
        if resource.is_partitioning {
            return Ok(());
        }

        let id_bytes = id.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let name = resource_index_table(&self.dimension, &resource.name);
            let mut table = txn.open_table(resource_def(&name))?;
            if table.remove(id_bytes.as_slice())?.is_none() {
                return Err(missing_resource_id_not_found(resource, id));
            }
        }
        for index in &resource.secondary_indexes {
            let name = secondary_index_table(&self.dimension, &resource.name, &index.name);
            purge_secondary_rows(&txn, &name, &id_bytes)?;
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        Ok(())
    }

    /// Removes one `(secondary key → resource id)` pair.
    ///
    /// # Errors
    ///
    /// Fails with [`NotFoundError::SecondaryKey`] if the pair is absent.
    pub fn delete_secondary_index_key(
        &self,
        resource: &Resource,
        index: &SecondaryIndex,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        let key_bytes = secondary_key.to_canonical_bytes();
        let id_bytes = resource_id.to_canonical_bytes();
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let name = secondary_index_table(&self.dimension, &resource.name, &index.name);
            let mut table = txn.open_multimap_table(secondary_def(&name))?;

            let doomed: Vec<Vec<u8>> = {
                let mut doomed = Vec::new();
                for value in table.get(key_bytes.as_slice())? {
                    let value = value?;
                    let entry: SecondaryIndexEntry = bincode::deserialize(value.value())?;
                    if entry.resource_id == id_bytes {
                        doomed.push(value.value().to_vec());
                    }
                }
                doomed
            };
            if doomed.is_empty() {
                return Err(NotFoundError::secondary_key(secondary_key).into());
            }
            for value in doomed {
                table.remove(key_bytes.as_slice(), value.as_slice())?;
            }
        }
        txn.commit().map_err(StorageError::from)?;

        self.stats.record_directory_write();
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Reads all primary index entries for a key, tolerating a directory
    /// that has never seen a write.
    fn read_primary_entries(&self, key_bytes: &[u8]) -> Result<Vec<PrimaryIndexEntry>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let name = primary_index_table(&self.dimension);
        let table = match txn.open_multimap_table(primary_def(&name)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        let mut entries = Vec::new();
        for value in table.get(key_bytes)? {
            let value = value?;
            entries.push(bincode::deserialize(value.value())?);
        }
        Ok(entries)
    }

    /// Reads one resource index entry, tolerating a missing table.
    fn read_resource_entry(
        &self,
        resource: &Resource,
        id_bytes: &[u8],
    ) -> Result<Option<ResourceIndexEntry>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let name = resource_index_table(&self.dimension, &resource.name);
        let table = match txn.open_table(resource_def(&name)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        match table.get(id_bytes)? {
            Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fails with [`HiveError::MissingParent`] unless the primary index
    /// holds a row for `key_bytes`. Runs inside the caller's transaction.
    fn require_primary_row(
        &self,
        txn: &WriteTransaction,
        key_bytes: &[u8],
        key: &KeyValue,
    ) -> Result<()> {
        let name = primary_index_table(&self.dimension);
        let table = txn.open_multimap_table(primary_def(&name))?;
        let mut values = table.get(key_bytes)?;
        if values.next().is_none() {
            return Err(HiveError::MissingParent(format!(
                "partition key {} has no primary index row",
                key
            )));
        }
        Ok(())
    }
}

/// Removes every value in a secondary index table whose resource id equals
/// `resource_id`. Runs inside the caller's transaction.
fn purge_secondary_rows(txn: &WriteTransaction, name: &str, resource_id: &[u8]) -> Result<u64> {
    let mut table = txn.open_multimap_table(secondary_def(name))?;

    let removals: Vec<(Vec<u8>, Vec<u8>)> = {
        let mut removals = Vec::new();
        for entry in table.iter()? {
            let (key, values) = entry?;
            for value in values {
                let value = value?;
                let row: SecondaryIndexEntry = bincode::deserialize(value.value())?;
                if row.resource_id == resource_id {
                    removals.push((key.value().to_vec(), value.value().to_vec()));
                }
            }
        }
        removals
    };

    let count = removals.len() as u64;
    for (key, value) in removals {
        table.remove(key.as_slice(), value.as_slice())?;
    }
    Ok(count)
}

/// Builds a "resource id not found" error labelled with the resource name.
fn missing_resource_id_not_found(resource: &Resource, id: &KeyValue) -> HiveError {
    NotFoundError::resource_id(format!("{} '{}'", resource.name, id)).into()
}

/// Builds a missing-parent error for an unknown resource id.
fn missing_resource_id(resource: &Resource, id: &KeyValue) -> HiveError {
    HiveError::MissingParent(format!(
        "resource id {} '{}' has no directory row",
        resource.name, id
    ))
}

/// Distinct node ids of a semaphore set, sorted ascending.
fn distinct_node_ids(semaphores: &[KeySemaphore]) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = Vec::new();
    for semaphore in semaphores {
        if !ids.contains(&semaphore.node_id) {
            ids.push(semaphore.node_id);
        }
    }
    ids.sort();
    ids
}
