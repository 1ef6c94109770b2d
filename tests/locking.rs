//! Integration tests for the three-scope lock engine.
//!
//! Scenario coverage: read-only hive blocks writes (S2), plus node-scope
//! and key-scope freezes and their composition.

use std::time::Duration;

use hivedir::{
    Access, Hive, HiveConfig, HiveError, KeyType, KeyValue, LockScope, Node, PartitionDimension,
    Resource, SecondaryIndex, Status,
};
use tempfile::tempdir;

fn config_at(dir: &tempfile::TempDir) -> HiveConfig {
    HiveConfig {
        sync_period: Duration::ZERO,
        ..HiveConfig::new(dir.path().join("hive.db").display().to_string())
    }
}

/// Hive with dimension `user`, node `n1`, and key 42 routed.
fn routed_hive(dir: &tempfile::TempDir) -> Hive {
    let hive = Hive::create(config_at(dir)).unwrap();
    hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    hive.add_node("user", Node::new("n1", "db://a")).unwrap();
    hive.insert_primary_index_key("user", &KeyValue::from(42i64)).unwrap();
    hive
}

// ============================================================================
// S2: read-only hive
// ============================================================================

#[test]
fn test_read_only_hive_blocks_key_insert() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);

    hive.update_hive_status(Status::ReadOnly).unwrap();

    let err = hive
        .insert_primary_index_key("user", &KeyValue::from(43i64))
        .unwrap_err();
    match err {
        HiveError::ReadOnly { scope, .. } => assert_eq!(scope, LockScope::Hive),
        other => panic!("expected ReadOnly, got {:?}", other),
    }

    hive.close().unwrap();
}

#[test]
fn test_read_only_hive_still_serves_reads() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    let key = KeyValue::from(42i64);

    hive.update_hive_status(Status::ReadOnly).unwrap();

    // Lookups and read connections keep working
    assert!(!hive.get_node_ids_of_primary_index_key("user", &key).unwrap().is_empty());
    let conn = hive.connection("user", &key, Access::Read).unwrap();
    assert!(conn.is_read_only());

    // Read-write connections are refused
    let err = hive.connection("user", &key, Access::ReadWrite).unwrap_err();
    assert!(err.is_read_only());

    hive.close().unwrap();
}

#[test]
fn test_read_only_hive_blocks_regardless_of_node_status() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);

    // Node stays writable; the hive freeze alone must block
    hive.update_hive_status(Status::ReadOnly).unwrap();
    assert_eq!(
        hive.dimension("user").unwrap().node("n1").unwrap().status,
        Status::Writable
    );

    let err = hive
        .insert_primary_index_key("user", &KeyValue::from(43i64))
        .unwrap_err();
    assert!(err.is_read_only());

    hive.close().unwrap();
}

// ============================================================================
// Node scope
// ============================================================================

#[test]
fn test_read_only_node_blocks_write_connection() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    let key = KeyValue::from(42i64);

    hive.update_node_status("user", "n1", Status::ReadOnly).unwrap();

    let err = hive.connection("user", &key, Access::ReadWrite).unwrap_err();
    match err {
        HiveError::ReadOnly { scope, .. } => assert_eq!(scope, LockScope::Node),
        other => panic!("expected ReadOnly, got {:?}", other),
    }

    // Reads keep working
    hive.connection("user", &key, Access::Read).unwrap();

    hive.close().unwrap();
}

#[test]
fn test_read_only_node_blocks_dependent_key_writes() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    hive.add_resource("user", Resource::new("weather", KeyType::Integer, false))
        .unwrap();

    hive.update_node_status("user", "n1", Status::ReadOnly).unwrap();

    // Inserting a resource id under key 42 requires node n1 writable
    let err = hive
        .insert_resource_id("user", "weather", &KeyValue::from(7i64), &KeyValue::from(42i64))
        .unwrap_err();
    assert!(err.is_read_only());

    hive.close().unwrap();
}

// ============================================================================
// Key scope
// ============================================================================

#[test]
fn test_key_freeze_and_thaw_roundtrip() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    let key = KeyValue::from(42i64);

    hive.update_primary_index_key_read_only("user", &key, true).unwrap();
    let err = hive.connection("user", &key, Access::ReadWrite).unwrap_err();
    match err {
        HiveError::ReadOnly { scope, .. } => assert_eq!(scope, LockScope::Key),
        other => panic!("expected ReadOnly, got {:?}", other),
    }

    // Thawing a frozen key must be possible
    hive.update_primary_index_key_read_only("user", &key, false).unwrap();
    hive.connection("user", &key, Access::ReadWrite).unwrap();

    hive.close().unwrap();
}

#[test]
fn test_frozen_key_blocks_dependent_inserts() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    hive.add_resource("user", Resource::new("weather", KeyType::Integer, false))
        .unwrap();
    hive.add_secondary_index("user", "weather", SecondaryIndex::new("city", KeyType::Text))
        .unwrap();
    let key = KeyValue::from(42i64);
    hive.insert_resource_id("user", "weather", &KeyValue::from(7i64), &key).unwrap();

    hive.update_primary_index_key_read_only("user", &key, true).unwrap();

    // A new resource id under the frozen key is refused
    let err = hive
        .insert_resource_id("user", "weather", &KeyValue::from(8i64), &key)
        .unwrap_err();
    assert!(err.is_read_only());

    // A secondary key whose resource id resolves to the frozen key is refused
    let err = hive
        .insert_secondary_index_key("user", "weather", "city", &KeyValue::from("NY"), &KeyValue::from(7i64))
        .unwrap_err();
    assert!(err.is_read_only());

    // Deleting the frozen key is refused until it thaws
    let err = hive.delete_primary_index_key("user", &key).unwrap_err();
    assert!(err.is_read_only());

    hive.update_primary_index_key_read_only("user", &key, false).unwrap();
    hive.delete_primary_index_key("user", &key).unwrap();

    hive.close().unwrap();
}

#[test]
fn test_freeze_unknown_key_is_not_found() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);

    let err = hive
        .update_primary_index_key_read_only("user", &KeyValue::from(1i64), true)
        .unwrap_err();
    assert!(err.is_not_found());

    hive.close().unwrap();
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_effective_writability_is_and_of_scopes() {
    let dir = tempdir().unwrap();
    let hive = routed_hive(&dir);
    let key = KeyValue::from(42i64);

    // Freeze key and node, then thaw one at a time; only when all three
    // scopes are writable does the write connection succeed.
    hive.update_primary_index_key_read_only("user", &key, true).unwrap();
    hive.update_node_status("user", "n1", Status::ReadOnly).unwrap();

    assert!(hive.connection("user", &key, Access::ReadWrite).unwrap_err().is_read_only());

    hive.update_node_status("user", "n1", Status::Writable).unwrap();
    assert!(hive.connection("user", &key, Access::ReadWrite).unwrap_err().is_read_only());

    hive.update_primary_index_key_read_only("user", &key, false).unwrap();
    hive.connection("user", &key, Access::ReadWrite).unwrap();

    hive.close().unwrap();
}
