//! Integration tests for hive lifecycle operations.
//!
//! These tests verify the end-to-end behavior of:
//! - Installing new hives
//! - Loading installed hives
//! - Configuration validation
//! - Metadata persistence across open/close cycles
//! - Attaching cooperating in-process instances

use std::time::Duration;

use hivedir::{Hive, HiveConfig, HiveError, KeyType, PartitionDimension, Status};
use tempfile::tempdir;

fn config_at(dir: &tempfile::TempDir) -> HiveConfig {
    HiveConfig {
        sync_period: Duration::ZERO,
        ..HiveConfig::new(dir.path().join("hive.db").display().to_string())
    }
}

// ============================================================================
// Install & Load
// ============================================================================

#[test]
fn test_create_installs_schema() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hive.db");
    assert!(!path.exists(), "database should not exist before create");

    let hive = Hive::create(config_at(&dir)).unwrap();

    assert!(path.exists(), "database file should exist after create");
    assert_eq!(hive.revision().unwrap(), 0);
    assert_eq!(hive.hive_status().unwrap(), Status::Writable);

    hive.close().unwrap();
}

#[test]
fn test_load_without_install_fails() {
    let dir = tempdir().unwrap();

    let err = Hive::load(config_at(&dir)).unwrap_err();
    assert!(matches!(err, HiveError::MetadataMissing(_)));
}

#[test]
fn test_load_installed_hive() {
    let dir = tempdir().unwrap();

    let hive = Hive::create(config_at(&dir)).unwrap();
    hive.close().unwrap();

    let hive = Hive::load(config_at(&dir)).unwrap();
    assert_eq!(hive.revision().unwrap(), 0);
    hive.close().unwrap();
}

#[test]
fn test_create_is_idempotent() {
    let dir = tempdir().unwrap();

    let hive = Hive::create(config_at(&dir)).unwrap();
    hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    let revision = hive.revision().unwrap();
    hive.close().unwrap();

    // A second create must not wipe the metadata or the revision
    let hive = Hive::create(config_at(&dir)).unwrap();
    assert_eq!(hive.revision().unwrap(), revision);
    assert!(hive.dimension("user").is_ok());
    hive.close().unwrap();
}

// ============================================================================
// Configuration validation
// ============================================================================

#[test]
fn test_empty_uri_rejected() {
    let config = HiveConfig::new("");
    let err = Hive::create(config).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_file_uri_prefix_accepted() {
    let dir = tempdir().unwrap();
    let config = HiveConfig {
        sync_period: Duration::ZERO,
        ..HiveConfig::new(format!("file:{}", dir.path().join("hive.db").display()))
    };

    let hive = Hive::create(config).unwrap();
    assert!(dir.path().join("hive.db").exists());
    hive.close().unwrap();
}

// ============================================================================
// Persistence across opens
// ============================================================================

#[test]
fn test_metadata_preserved_across_opens() {
    let dir = tempdir().unwrap();

    let hive = Hive::create(config_at(&dir)).unwrap();
    let created = hive
        .add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();
    hive.close().unwrap();

    let hive = Hive::load(config_at(&dir)).unwrap();
    let loaded = hive.dimension("user").unwrap();
    assert_eq!(loaded, created);
    hive.close().unwrap();
}

#[test]
fn test_multiple_open_close_cycles() {
    let dir = tempdir().unwrap();

    Hive::create(config_at(&dir)).unwrap().close().unwrap();
    for i in 0..5 {
        let hive = Hive::load(config_at(&dir)).unwrap();
        assert_eq!(hive.revision().unwrap(), 0, "iteration {} failed", i);
        hive.close().unwrap();
    }
}

// ============================================================================
// Cooperating instances
// ============================================================================

#[test]
fn test_attach_second_instance() {
    let dir = tempdir().unwrap();

    let first = Hive::create(config_at(&dir)).unwrap();
    let second = Hive::attach(first.store().clone(), config_at(&dir)).unwrap();

    assert_eq!(second.revision().unwrap(), first.revision().unwrap());

    second.close().unwrap();
    first.close().unwrap();
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_statistics_disabled_by_default() {
    let dir = tempdir().unwrap();
    let hive = Hive::create(config_at(&dir)).unwrap();

    hive.add_partition_dimension(PartitionDimension::new("user", KeyType::Integer))
        .unwrap();

    let snapshot = hive.statistics();
    assert_eq!(snapshot.directory_reads, 0);
    assert_eq!(snapshot.directory_writes, 0);

    hive.close().unwrap();
}
