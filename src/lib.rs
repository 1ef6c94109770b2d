//! # HiveDir
//!
//! Embedded partitioning directory - key-to-shard routing for horizontally
//! partitioned deployments.
//!
//! A **hive** maps application-level partition keys to the physical data
//! nodes that hold their records. Applications ask "where does the record
//! with key K live?" and the hive answers with a connection to the correct
//! shard. Secondary index keys let records be located by attributes other
//! than the partition key, and read-only locking at three granularities
//! (hive, node, key) lets operators freeze writes during migrations.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hivedir::{Access, Hive, HiveConfig, KeyType, KeyValue, Node, PartitionDimension};
//!
//! // Install the metadata schema and open the hive
//! let hive = Hive::create(HiveConfig::new("./hive.db"))?;
//!
//! // Describe the deployment: one dimension, one node
//! hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))?;
//! hive.add_node("user", Node::new("n1", "db://a"))?;
//!
//! // Route a new partition key; the assigner picks the node
//! hive.insert_primary_index_key("user", &KeyValue::from(42i64))?;
//!
//! // Connect to the shard holding the key
//! let conn = hive.connection("user", &KeyValue::from(42i64), Access::Read)?;
//! println!("key 42 lives at {}", conn.uri());
//!
//! hive.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Partition dimension
//!
//! A **dimension** is a partitioning axis ("which attribute shards the
//! data"), owning a set of **nodes** (physical shards) and **resources**
//! (entity classes). A hive typically has one dimension; multiple are
//! permitted.
//!
//! ### Directory
//!
//! The per-dimension **directory** holds the persisted routing tables:
//! partition key → node semaphores, resource id → partition key, and
//! secondary key → resource ids.
//!
//! ### Revision synchronization
//!
//! Every metadata mutation bumps the hive-wide revision. Cooperating hive
//! instances compare their cached revision against the persisted one (on a
//! background timer and before it on demand) and reload the whole metadata
//! graph when they diverge.
//!
//! ## Thread Safety
//!
//! [`Hive`] is `Send + Sync` and can be shared across threads using `Arc`.
//! Readers work against immutable snapshots of the metadata graph;
//! mutations are serialised internally and publish fresh snapshots
//! atomically.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod hive;
mod sync;
mod types;

pub mod assigner;
pub mod connection;
pub mod directory;
pub mod lock;
pub mod meta;
pub mod metrics;
pub mod storage;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main hive interface
pub use hive::Hive;

// Configuration
pub use config::{HiveConfig, DEFAULT_SYNC_PERIOD};

// Error handling
pub use error::{HiveError, NotFoundError, Result, StorageError, ValidationError};

// Core types
pub use types::{
    Access, DimensionId, KeyType, KeyValue, NodeId, ResourceId, SecondaryIndexId, Status,
    Timestamp, UNSAVED_ID,
};

// Metadata model
pub use meta::{HiveSemaphore, KeySemaphore, Node, PartitionDimension, Resource, SecondaryIndex};

// Routing policy
pub use assigner::{Assigner, HashAssigner};

// Connections
pub use connection::{ConnectionSource, DirectConnectionSource, NodeConnection};

// Directory access
pub use directory::DirectoryFacade;

// Locking
pub use lock::LockScope;

// Observability
pub use metrics::{HiveStatistics, StatisticsSnapshot};

// Storage (for cooperating in-process instances)
pub use storage::HiveStore;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common HiveDir usage.
///
/// ```rust
/// use hivedir::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::HiveConfig;
    pub use crate::connection::NodeConnection;
    pub use crate::error::{HiveError, Result};
    pub use crate::hive::Hive;
    pub use crate::meta::{Node, PartitionDimension, Resource, SecondaryIndex};
    pub use crate::types::{Access, KeyType, KeyValue, Status};
}
