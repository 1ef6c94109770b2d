//! Integration tests for revision-driven synchronization between
//! cooperating hive instances.
//!
//! Scenario coverage: revision convergence (S6). Cooperating instances are
//! modelled as two `Hive` handles attached to the same store, each with its
//! own cached graph, revision, and sync daemon.

use std::time::Duration;

use hivedir::{
    Hive, HiveConfig, KeyType, KeyValue, Node, PartitionDimension, Resource, Status,
};
use tempfile::tempdir;

fn manual_config(dir: &tempfile::TempDir) -> HiveConfig {
    HiveConfig {
        sync_period: Duration::ZERO,
        ..HiveConfig::new(dir.path().join("hive.db").display().to_string())
    }
}

// ============================================================================
// Manual synchronization
// ============================================================================

#[test]
fn test_peer_sees_mutation_after_sync() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    let reader = Hive::attach(writer.store().clone(), manual_config(&dir)).unwrap();

    writer
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();

    // The reader's cache is stale until it synchronizes
    assert!(reader.dimension("user").unwrap_err().is_not_found());
    assert!(reader.force_synchronize().unwrap());
    assert_eq!(reader.revision().unwrap(), writer.revision().unwrap());
    assert!(reader.dimension("user").is_ok());

    reader.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn test_sync_without_divergence_is_a_no_op() {
    let dir = tempdir().unwrap();
    let hive = Hive::create(manual_config(&dir)).unwrap();

    assert!(!hive.force_synchronize().unwrap());
    hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    // The facade already synced after the mutation
    assert!(!hive.force_synchronize().unwrap());

    hive.close().unwrap();
}

#[test]
fn test_double_sync_converges_to_same_graph() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    let reader = Hive::attach(writer.store().clone(), manual_config(&dir)).unwrap();

    writer
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    writer.add_node("user", Node::new("n1", "db://a")).unwrap();

    reader.force_synchronize().unwrap();
    let first = reader.dimensions().unwrap();
    reader.force_synchronize().unwrap();
    let second = reader.dimensions().unwrap();

    assert_eq!(first, second);
    assert_eq!(first, writer.dimensions().unwrap());

    reader.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn test_status_change_propagates() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    let reader = Hive::attach(writer.store().clone(), manual_config(&dir)).unwrap();

    writer.update_hive_status(Status::ReadOnly).unwrap();

    assert_eq!(reader.hive_status().unwrap(), Status::Writable);
    reader.force_synchronize().unwrap();
    assert_eq!(reader.hive_status().unwrap(), Status::ReadOnly);

    // The frozen peer now refuses writes too
    let err = reader
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap_err();
    assert!(err.is_read_only());

    reader.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn test_directory_rows_visible_to_peer() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    let reader = Hive::attach(writer.store().clone(), manual_config(&dir)).unwrap();

    writer
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    writer.add_node("user", Node::new("n1", "db://a")).unwrap();
    writer
        .add_resource("user", Resource::new("weather", KeyType::Integer, false))
        .unwrap();

    reader.force_synchronize().unwrap();

    // Key rows are shared storage, not cached; a peer sees them as soon as
    // its metadata graph knows the dimension
    writer.insert_primary_index_key("user", &KeyValue::from(42i64)).unwrap();
    assert!(!reader
        .get_node_ids_of_primary_index_key("user", &KeyValue::from(42i64))
        .unwrap()
        .is_empty());

    reader.close().unwrap();
    writer.close().unwrap();
}

// ============================================================================
// S6: daemon-driven convergence
// ============================================================================

#[test]
fn test_daemon_converges_revision() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    let reader = Hive::attach(
        writer.store().clone(),
        HiveConfig {
            sync_period: Duration::from_millis(25),
            ..manual_config(&dir)
        },
    )
    .unwrap();

    writer
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    let target = writer.revision().unwrap();

    // Wait out a few daemon ticks
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if reader.revision().unwrap() == target {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "reader never converged to revision {}",
            target
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(reader.dimension("user").is_ok());

    reader.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn test_daemon_stops_on_close() {
    let dir = tempdir().unwrap();
    let hive = Hive::create(HiveConfig {
        sync_period: Duration::from_millis(10),
        ..manual_config(&dir)
    })
    .unwrap();

    // close() joins the daemon; a prompt return is the assertion
    hive.close().unwrap();
}

// ============================================================================
// Concurrent access within one instance
// ============================================================================

#[test]
fn test_concurrent_syncs_and_reads() {
    let dir = tempdir().unwrap();
    let writer = Hive::create(manual_config(&dir)).unwrap();
    writer
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    let reader =
        std::sync::Arc::new(Hive::attach(writer.store().clone(), manual_config(&dir)).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reader = std::sync::Arc::clone(&reader);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    reader.force_synchronize().unwrap();
                    let _ = reader.dimensions().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(reader.revision().unwrap(), writer.revision().unwrap());
    writer.close().unwrap();
}
