//! Tests for Drive
//!
//! These tests verify:
//! - Storing and loading records across one or many packets
//! - Chain reclamation on overwrite and remove
//! - Reopening with captured index metadata (parity check)
//! - Disposal semantics

use std::collections::BTreeMap;
use std::path::PathBuf;

use packetkv::drive::{Drive, EMPTY, END_OF_PACKETS, PACKET_SIZE};
use packetkv::{FindRange, StoreError};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    name: String,
    payload: Vec<u8>,
}

fn item(id: u32, name: &str) -> Item {
    Item {
        id,
        name: name.to_string(),
        payload: Vec::new(),
    }
}

/// Payload lz4 cannot shrink, so the chain length tracks `size`
fn noisy_item(id: u32, size: usize) -> Item {
    let mut state: u32 = 0x9e37_79b9 ^ id;
    let payload = (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    Item {
        id,
        name: format!("noisy-{}", id),
        payload,
    }
}

fn setup_temp_drive() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("0.db");
    (temp_dir, path)
}

fn used_packets(drive: &Drive<u32, Item>) -> usize {
    drive
        .next_index_of_packets()
        .iter()
        .skip(1)
        .filter(|&&next| next != EMPTY)
        .count()
}

fn reopen(
    path: &PathBuf,
    toc: BTreeMap<u32, i32>,
    niop: Vec<i32>,
) -> packetkv::Result<Drive<u32, Item>> {
    Drive::open(path, toc, niop)
}

// =============================================================================
// Store / Load Tests
// =============================================================================

#[test]
fn test_store_and_load_small_record() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();

    drive.store(1, &item(1, "alpha")).unwrap();

    assert_eq!(drive.load(&1).unwrap(), item(1, "alpha"));
    assert_eq!(drive.count(), 1);
    assert_eq!(used_packets(&drive), 1);
}

#[test]
fn test_load_missing_key() {
    let (_temp, path) = setup_temp_drive();
    let drive: Drive<u32, Item> = Drive::create(&path).unwrap();

    assert!(matches!(drive.load(&42), Err(StoreError::NotFound)));
    assert_eq!(drive.try_load(&42).unwrap(), None);
}

#[test]
fn test_large_record_spans_packets() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    let big = noisy_item(7, 8 * PACKET_SIZE);

    drive.store(7, &big).unwrap();

    assert!(used_packets(&drive) > 8);
    assert_eq!(drive.load(&7).unwrap(), big);
}

#[test]
fn test_chain_is_terminated() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    drive.store(3, &noisy_item(3, 3 * PACKET_SIZE)).unwrap();

    let niop = drive.next_index_of_packets();
    let mut index = drive.head_of(&3).unwrap() as usize;
    let mut hops = 0;
    while niop[index] != END_OF_PACKETS {
        assert!(niop[index] > 0);
        index = niop[index] as usize;
        hops += 1;
        assert!(hops < niop.len());
    }
    assert!(hops >= 3);
}

#[test]
fn test_overwrite_reclaims_old_chain() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();

    drive.store(1, &noisy_item(1, 6 * PACKET_SIZE)).unwrap();
    let big_usage = used_packets(&drive);

    drive.store(1, &item(1, "small")).unwrap();

    assert_eq!(used_packets(&drive), 1);
    assert!(big_usage > 1);
    assert_eq!(drive.load(&1).unwrap(), item(1, "small"));
    assert_eq!(drive.count(), 1);
}

#[test]
fn test_freed_packets_are_reused() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();

    drive.store(1, &item(1, "one")).unwrap();
    drive.store(2, &item(2, "two")).unwrap();
    let first_head = drive.head_of(&1).unwrap();

    assert!(drive.remove(&1).unwrap());
    drive.store(3, &item(3, "three")).unwrap();

    assert_eq!(drive.head_of(&3), Some(first_head));
    assert_eq!(drive.load(&2).unwrap(), item(2, "two"));
}

#[test]
fn test_next_empty_index_does_not_reserve() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();

    assert_eq!(drive.next_empty_index(0), 1);
    assert_eq!(drive.next_empty_index(0), 1);
    assert_eq!(drive.next_empty_index(4), 5);

    drive.store(1, &item(1, "x")).unwrap();
    assert_eq!(drive.head_of(&1), Some(1));
    assert_eq!(drive.next_empty_index(0), 2);
}

#[test]
fn test_remove_is_idempotent() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    drive.store(1, &item(1, "one")).unwrap();

    assert!(drive.remove(&1).unwrap());
    assert!(!drive.remove(&1).unwrap());
    assert_eq!(drive.try_load(&1).unwrap(), None);
    assert_eq!(drive.count(), 0);
    assert_eq!(used_packets(&drive), 0);
}

#[test]
fn test_load_from_exact_index() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    drive.store(5, &item(5, "five")).unwrap();

    let head = drive.head_of(&5).unwrap();
    assert_eq!(drive.load_from_exact_index(head).unwrap(), item(5, "five"));
    assert!(drive.load_from_exact_index(0).unwrap_err().is_persistence());
}

#[test]
fn test_find_with_range_and_cap() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    for id in 1..=10 {
        drive.store(id, &item(id, &format!("n{}", id))).unwrap();
    }

    let range = FindRange::between(3, 8);
    let even = drive
        .find(&|v: &Item| v.id % 2 == 0, Some(&range), Some(2))
        .unwrap();

    let ids: Vec<u32> = even.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![4, 6]);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_with_captured_metadata() {
    let (_temp, path) = setup_temp_drive();
    let big = noisy_item(9, 4 * PACKET_SIZE);

    let (toc, niop) = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.store(1, &item(1, "one")).unwrap();
        drive.store(9, &big).unwrap();
        drive.dispose().unwrap();
        (
            drive.table_of_contents().clone(),
            drive.next_index_of_packets(),
        )
    };

    let drive = reopen(&path, toc, niop).unwrap();
    assert_eq!(drive.count(), 2);
    assert_eq!(drive.load(&1).unwrap(), item(1, "one"));
    assert_eq!(drive.load(&9).unwrap(), big);
}

#[test]
fn test_reopen_empty_drive() {
    let (_temp, path) = setup_temp_drive();
    let niop = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.dispose().unwrap();
        drive.next_index_of_packets()
    };

    let drive = reopen(&path, BTreeMap::new(), niop).unwrap();
    assert_eq!(drive.count(), 0);
}

#[test]
fn test_reopen_detects_tampered_toc() {
    let (_temp, path) = setup_temp_drive();
    let (mut toc, niop) = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.store(1, &item(1, "one")).unwrap();
        drive.store(2, &item(2, "two")).unwrap();
        drive.dispose().unwrap();
        (
            drive.table_of_contents().clone(),
            drive.next_index_of_packets(),
        )
    };
    toc.insert(2, 7);

    let err = reopen(&path, toc, niop).unwrap_err();
    assert!(matches!(err, StoreError::ParityMismatch { .. }));
    assert!(err.is_persistence());
}

#[test]
fn test_reopen_detects_tampered_packet_table() {
    let (_temp, path) = setup_temp_drive();
    let (toc, mut niop) = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.store(1, &item(1, "one")).unwrap();
        drive.dispose().unwrap();
        (
            drive.table_of_contents().clone(),
            drive.next_index_of_packets(),
        )
    };
    niop[5] = 6;

    let err = reopen(&path, toc, niop).unwrap_err();
    assert!(matches!(err, StoreError::ParityMismatch { .. }));
}

#[test]
fn test_failed_reopen_leaves_parity_intact() {
    let (_temp, path) = setup_temp_drive();
    let (toc, niop) = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.store(1, &item(1, "one")).unwrap();
        drive.dispose().unwrap();
        (
            drive.table_of_contents().clone(),
            drive.next_index_of_packets(),
        )
    };

    let mut wrong = toc.clone();
    wrong.insert(1, 3);
    assert!(reopen(&path, wrong, niop.clone()).is_err());

    let drive = reopen(&path, toc, niop).unwrap();
    assert_eq!(drive.load(&1).unwrap(), item(1, "one"));
}

#[test]
fn test_open_missing_file() {
    let (_temp, path) = setup_temp_drive();
    let err = reopen(&path, BTreeMap::new(), Vec::new()).unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
}

#[test]
fn test_drop_writes_parity() {
    let (_temp, path) = setup_temp_drive();
    let (toc, niop) = {
        let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
        drive.store(4, &item(4, "four")).unwrap();
        (
            drive.table_of_contents().clone(),
            drive.next_index_of_packets(),
        )
    };

    let drive = reopen(&path, toc, niop).unwrap();
    assert_eq!(drive.load(&4).unwrap(), item(4, "four"));
}

// =============================================================================
// Disposal Tests
// =============================================================================

#[test]
fn test_operations_after_dispose_fail() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    drive.store(1, &item(1, "one")).unwrap();
    drive.dispose().unwrap();

    assert!(drive.is_disposed());
    assert!(matches!(drive.load(&1), Err(StoreError::Disposed(_))));
    assert!(matches!(
        drive.store(2, &item(2, "two")),
        Err(StoreError::Disposed(_))
    ));
    assert!(matches!(drive.remove(&1), Err(StoreError::Disposed(_))));
    assert!(matches!(drive.dispose(), Err(StoreError::Disposed(_))));
}

#[test]
fn test_optimize_is_unsupported() {
    let (_temp, path) = setup_temp_drive();
    let mut drive: Drive<u32, Item> = Drive::create(&path).unwrap();
    assert!(matches!(drive.optimize(), Err(StoreError::Unsupported(_))));
}
