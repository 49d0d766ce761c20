//! Tests for the snapshot store
//!
//! These tests verify:
//! - Write/load round trips
//! - Atomic replacement (no temp files left behind)
//! - Metadata-only info
//! - Verification and deletion
//! - Export/import to arbitrary paths

use std::collections::HashMap;

use tempfile::TempDir;

use kvlite::snapshot::{self, SnapshotStore, SNAPSHOT_VERSION};

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_data(n: usize) -> HashMap<String, String> {
    (0..n)
        .map(|i| (format!("key{i}"), format!("value{i}")))
        .collect()
}

// =============================================================================
// Write / Load
// =============================================================================

#[test]
fn test_write_and_load() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    let data = sample_data(10);
    store.write(&data).unwrap();

    let snapshot = store.load().unwrap().expect("snapshot should exist");
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.key_count, 10);
    assert_eq!(snapshot.data, data);
    assert!(snapshot.timestamp > 0);
}

#[test]
fn test_load_absent_returns_none() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    assert!(store.load().unwrap().is_none());
    assert!(!store.exists());
    assert_eq!(store.size().unwrap(), 0);
    assert!(store.info().unwrap().is_none());
}

#[test]
fn test_write_replaces_previous() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    store.write(&sample_data(3)).unwrap();
    store.write(&sample_data(7)).unwrap();

    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.key_count, 7);
}

#[test]
fn test_no_temp_files_left_behind() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    store.write(&sample_data(5)).unwrap();
    store.write(&sample_data(5)).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty(), "temp files remain: {leftovers:?}");
}

#[test]
fn test_empty_data_round_trips() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    store.write(&HashMap::new()).unwrap();
    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.key_count, 0);
    assert!(snapshot.data.is_empty());
}

// =============================================================================
// Info / Verify / Delete
// =============================================================================

#[test]
fn test_info_matches_contents() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    store.write(&sample_data(4)).unwrap();

    let info = store.info().unwrap().expect("info should exist");
    assert_eq!(info.version, SNAPSHOT_VERSION);
    assert_eq!(info.key_count, 4);
    assert!(info.size > 0);
    assert_eq!(info.size, store.size().unwrap());
}

#[test]
fn test_verify_ok_and_missing() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    assert!(store.verify().is_err());

    store.write(&sample_data(2)).unwrap();
    store.verify().unwrap();
}

#[test]
fn test_verify_rejects_corrupt_file() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    std::fs::write(store.path(), b"{ not json").unwrap();
    assert!(store.verify().is_err());
    assert!(store.load().is_err());
}

#[test]
fn test_delete() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path()).unwrap();

    store.write(&sample_data(1)).unwrap();
    assert!(store.exists());

    store.delete().unwrap();
    assert!(!store.exists());

    // Deleting an absent snapshot is not an error.
    store.delete().unwrap();
}

// =============================================================================
// Export / Import
// =============================================================================

#[test]
fn test_export_import_round_trip() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("backup.snapshot");

    let data = sample_data(6);
    snapshot::export(&data, &dest).unwrap();

    let imported = snapshot::import(&dest).unwrap();
    assert_eq!(imported, data);
}
