//! Tests for manage data checkpoints
//!
//! These tests verify:
//! - Save/load of per-shard index metadata
//! - Corruption detection (magic, version, checksum, truncation)
//! - Restoring a data store from a checkpoint file

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use packetkv::{manage, Config, DataStore, ShardIndex, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_checkpoint() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("manage.pkvm");
    (temp_dir, path)
}

fn sample_data() -> Vec<ShardIndex<String>> {
    let mut toc = BTreeMap::new();
    toc.insert("alpha".to_string(), 1);
    toc.insert("beta".to_string(), 3);
    vec![
        ShardIndex {
            table_of_contents: toc,
            next_index_of_packets: vec![0, 0, -1, 4, 0],
        },
        ShardIndex {
            table_of_contents: BTreeMap::new(),
            next_index_of_packets: vec![0],
        },
    ]
}

// =============================================================================
// File Format Tests
// =============================================================================

#[test]
fn test_save_and_load() {
    let (_temp, path) = setup_temp_checkpoint();
    let data = sample_data();

    manage::save(&path, &data).unwrap();
    let loaded: Vec<ShardIndex<String>> = manage::load(&path).unwrap();

    assert_eq!(loaded, data);
    assert_eq!(loaded[0].len(), 2);
    assert!(loaded[1].is_empty());
}

#[test]
fn test_save_replaces_previous_checkpoint() {
    let (_temp, path) = setup_temp_checkpoint();

    manage::save(&path, &sample_data()).unwrap();
    manage::save::<String>(&path, &[]).unwrap();

    let loaded: Vec<ShardIndex<String>> = manage::load(&path).unwrap();
    assert!(loaded.is_empty());
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn test_load_missing_file() {
    let (_temp, path) = setup_temp_checkpoint();
    let result = manage::load::<String>(&path);
    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let (_temp, path) = setup_temp_checkpoint();
    manage::save(&path, &sample_data()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    let result = manage::load::<String>(&path);
    assert!(matches!(result, Err(StoreError::Persistence(_))));
}

#[test]
fn test_unknown_version_rejected() {
    let (_temp, path) = setup_temp_checkpoint();
    manage::save(&path, &sample_data()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[4] = 0xFF;
    fs::write(&path, &bytes).unwrap();

    let result = manage::load::<String>(&path);
    assert!(matches!(result, Err(StoreError::Persistence(_))));
}

#[test]
fn test_flipped_payload_bit_detected() {
    let (_temp, path) = setup_temp_checkpoint();
    manage::save(&path, &sample_data()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let err = manage::load::<String>(&path).unwrap_err();
    assert!(err.is_persistence());
    assert!(err.to_string().contains("checksum"));
}

#[test]
fn test_truncated_file_rejected() {
    let (_temp, path) = setup_temp_checkpoint();
    manage::save(&path, &sample_data()).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
    assert!(manage::load::<String>(&path).unwrap_err().is_persistence());

    fs::write(&path, &bytes[..10]).unwrap();
    assert!(manage::load::<String>(&path).unwrap_err().is_persistence());
}

// =============================================================================
// Store Integration Tests
// =============================================================================

#[test]
fn test_checkpoint_restores_data_store() {
    let temp = TempDir::new().unwrap();
    let checkpoint = temp.path().join("manage.pkvm");
    let config = Config::builder()
        .data_dir(temp.path())
        .chunk_count(4)
        .alive_threshold(4)
        .deadly_threshold(2)
        .build();
    let key_fn = || Arc::new(|pair: &(String, u64)| pair.0.clone());

    {
        let store: DataStore<String, (String, u64)> =
            DataStore::create(config.clone(), key_fn()).unwrap();
        for i in 0..50u64 {
            store.store((format!("key-{:02}", i), i * i)).unwrap();
        }
        let manage_data = store.close().unwrap();
        manage::save(&checkpoint, &manage_data).unwrap();
    }

    let manage_data = manage::load(&checkpoint).unwrap();
    let store: DataStore<String, (String, u64)> =
        DataStore::restore(config, key_fn(), manage_data).unwrap();

    assert_eq!(store.count().unwrap(), 50);
    assert_eq!(
        store.get(&"key-07".to_string()).unwrap(),
        Some(("key-07".to_string(), 49))
    );
}
