//! Manage data
//!
//! The index metadata a caller keeps between runs: one table of contents and
//! one packet table per shard. Passing it back to
//! [`DataStore::restore`](crate::DataStore::restore) reopens the shard files.
//!
//! ## Checkpoint File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                           │
//! │   Magic: "PKVM" (4) | Version: u16 (2) | Len: u64 (8)       │
//! │   CRC32 of payload: u32 (4)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Payload (Len bytes, bincode)                                │
//! │   Vec<ShardIndex<K>>                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::record::Key;

/// Magic bytes identifying a checkpoint file
const MAGIC: &[u8; 4] = b"PKVM";

/// Current checkpoint format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Len (8) + CRC (4) = 18 bytes
const HEADER_SIZE: usize = 18;

/// Index metadata of one shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "K: Key")]
pub struct ShardIndex<K> {
    /// Key → head packet
    pub table_of_contents: BTreeMap<K, i32>,

    /// Flattened next-index-of-packets table
    pub next_index_of_packets: Vec<i32>,
}

impl<K: Key> ShardIndex<K> {
    /// Number of keys with a live head packet
    pub fn len(&self) -> usize {
        self.table_of_contents
            .values()
            .filter(|&&head| head > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index metadata of every shard, in shard order
pub type ManageData<K> = Vec<ShardIndex<K>>;

/// Write a checkpoint file, replacing any previous one atomically
pub fn save<K: Key>(path: impl AsRef<Path>, data: &[ShardIndex<K>]) -> Result<()> {
    let path = path.as_ref();
    let payload = bincode::serialize(data)
        .map_err(|e| StoreError::Serialization(format!("Failed to encode manage data: {}", e)))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(MAGIC)?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), shards = data.len(), "Saved manage data");
    Ok(())
}

/// Read a checkpoint file written by [`save`]
pub fn load<K: Key>(path: impl AsRef<Path>) -> Result<ManageData<K>> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Persistence(format!(
            "Manage data file {} is truncated",
            path.display()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(StoreError::Persistence(format!(
            "Invalid manage data magic: expected PKVM, got {:?}",
            &bytes[0..4]
        )));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(StoreError::Persistence(format!(
            "Unsupported manage data version: {}",
            version
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let len = u64::from_le_bytes(len_bytes) as usize;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[14..18]);
    let expected_crc = u32::from_le_bytes(crc_bytes);

    let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
        StoreError::Persistence(format!(
            "Manage data declares {} bytes but file holds {}",
            len,
            bytes.len() - HEADER_SIZE
        ))
    })?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let actual_crc = hasher.finalize();
    if actual_crc != expected_crc {
        return Err(StoreError::Persistence(format!(
            "Manage data checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
            expected_crc, actual_crc
        )));
    }

    let data: ManageData<K> = bincode::deserialize(payload)
        .map_err(|e| StoreError::Persistence(format!("Failed to decode manage data: {}", e)))?;

    debug!(path = %path.display(), shards = data.len(), "Loaded manage data");
    Ok(data)
}
