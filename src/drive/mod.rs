//! Drive Module
//!
//! One packet file holding the records of one shard.
//!
//! ## Responsibilities
//! - Allocate fixed-size packets and chain them per record
//! - Keep the table of contents (key → head packet)
//! - Compress payloads before they are split across packets
//! - Verify index metadata parity when reopening a file
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Packet 0 (256)                         │
//! │   Parity (16) | unused                 │
//! ├────────────────────────────────────────┤
//! │ Packet 1 (256)                         │
//! │   payload bytes of some chain          │
//! ├────────────────────────────────────────┤
//! │ ...                                    │
//! └────────────────────────────────────────┘
//! ```
//!
//! Chains and the table of contents live in memory. They are handed to the
//! caller as [`ShardIndex`](crate::manage::ShardIndex) and supplied back when
//! the file is reopened.

mod codec;
mod packets;
mod parity;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Result, StoreError};
use crate::record::{Key, Record};
use crate::store::range::{scan, FindRange};

use packets::PacketTable;
pub use packets::{BLOCK_SIZE, EMPTY, END_OF_PACKETS};
pub use parity::PARITY_SIZE;

/// Size of one on-disk packet
pub const PACKET_SIZE: usize = 256;

/// Packet store for a single file
///
/// ## Concurrency:
/// - Mutating methods take `&mut self`; the owner decides how to share it
///   (a chunk keeps it behind an `RwLock`)
/// - `file`: every seek+transfer runs inside this mutex, so concurrent
///   loads through `&self` never interleave seeks
#[derive(Debug)]
pub struct Drive<K, V> {
    /// Backing file path
    path: PathBuf,

    /// `None` once disposed
    file: Mutex<Option<File>>,

    /// Key → head packet index. Negative heads mean absent.
    table_of_contents: BTreeMap<K, i32>,

    /// Next index of packets, also the free list
    packets: PacketTable,

    disposed: bool,

    _record: PhantomData<fn() -> V>,
}

impl<K: Key, V: Record> Drive<K, V> {
    /// Create a new, empty packet file (truncating any existing one)
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        debug!(path = %path.display(), "Created packet file");

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            table_of_contents: BTreeMap::new(),
            packets: PacketTable::new(),
            disposed: false,
            _record: PhantomData,
        })
    }

    /// Reopen a packet file with previously captured index metadata
    ///
    /// Fails with [`StoreError::ParityMismatch`] when the metadata does not
    /// match the parity written at the last dispose.
    pub fn open(
        path: impl AsRef<Path>,
        table_of_contents: BTreeMap<K, i32>,
        next_index_of_packets: impl IntoIterator<Item = i32>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                StoreError::Persistence(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let mut drive = Self {
            path,
            file: Mutex::new(Some(file)),
            table_of_contents,
            packets: PacketTable::from_sequence(next_index_of_packets),
            disposed: false,
            _record: PhantomData,
        };

        let stored = match drive.read_parity() {
            Ok(stored) => stored,
            Err(e) => {
                drive.disposed = true;
                return Err(e);
            }
        };
        if stored != Some(drive.parity()) {
            // Never rewrite parity over metadata we could not verify.
            drive.disposed = true;
            warn!(path = %drive.path.display(), "Index table verification failed");
            return Err(StoreError::ParityMismatch {
                path: drive.path.clone(),
            });
        }

        debug!(
            path = %drive.path.display(),
            records = drive.count(),
            "Reopened packet file"
        );
        Ok(drive)
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Store a value under `key`, replacing (and reclaiming) any previous chain
    pub fn store(&mut self, key: K, value: &V) -> Result<()> {
        self.check_disposed()?;

        let payload = codec::encode(value)?;
        self.remove(&key)?;

        let packet_count = payload.len().div_ceil(PACKET_SIZE).max(1);
        let mut chain = Vec::with_capacity(packet_count);
        let mut last = 0;
        for _ in 0..packet_count {
            last = self.packets.next_empty(last);
            chain.push(last);
        }

        let written = to_link(chain[0]).and_then(|head| {
            self.link_chain(&chain)?;
            self.write_chain(&chain, &payload)?;
            Ok(head)
        });
        match written {
            Ok(head) => {
                self.table_of_contents.insert(key, head);
                Ok(())
            }
            Err(e) => {
                for &index in &chain {
                    self.packets.set(index, EMPTY);
                }
                Err(e)
            }
        }
    }

    /// Load a value, or `None` if the key is absent
    pub fn try_load(&self, key: &K) -> Result<Option<V>> {
        self.check_disposed()?;
        match self.table_of_contents.get(key) {
            Some(&head) if head > 0 => self.load_at(head as usize).map(Some),
            _ => Ok(None),
        }
    }

    /// Load a value; an absent key is [`StoreError::NotFound`]
    pub fn load(&self, key: &K) -> Result<V> {
        self.try_load(key)?.ok_or(StoreError::NotFound)
    }

    /// Load the chain starting at `index`, bypassing the table of contents
    ///
    /// The caller must hold an index it obtained from this drive; a stale
    /// index yields a persistence error or an unrelated record.
    pub fn load_from_exact_index(&self, index: i32) -> Result<V> {
        self.check_disposed()?;
        if index <= 0 {
            return Err(StoreError::Persistence(format!(
                "Invalid head packet index {}",
                index
            )));
        }
        self.load_at(index as usize)
    }

    /// Remove a key and free its packets
    ///
    /// Returns false if the key is absent or its chain was already cleared.
    pub fn remove(&mut self, key: &K) -> Result<bool> {
        self.check_disposed()?;
        match self.table_of_contents.remove(key) {
            Some(head) if head > 0 => Ok(self.release_chain(head as usize)),
            _ => Ok(false),
        }
    }

    /// Scan stored records in key order
    pub fn find(
        &self,
        predicate: &dyn Fn(&V) -> bool,
        range: Option<&FindRange<K>>,
        max_count: Option<usize>,
    ) -> Result<Vec<V>> {
        self.check_disposed()?;
        let limit = max_count.unwrap_or(usize::MAX);
        let mut found = Vec::new();
        for (_, &head) in scan(&self.table_of_contents, range) {
            if found.len() >= limit {
                break;
            }
            if head <= 0 {
                continue;
            }
            let value = self.load_at(head as usize)?;
            if predicate(&value) {
                found.push(value);
            }
        }
        Ok(found)
    }

    /// Compact the file. Not supported.
    pub fn optimize(&mut self) -> Result<()> {
        self.check_disposed()?;
        Err(StoreError::Unsupported("packet file compaction"))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Number of stored records
    pub fn count(&self) -> usize {
        self.table_of_contents
            .values()
            .filter(|&&head| head > 0)
            .count()
    }

    /// Head packet of `key`, if stored
    pub fn head_of(&self, key: &K) -> Option<i32> {
        self.table_of_contents
            .get(key)
            .copied()
            .filter(|&head| head > 0)
    }

    pub fn table_of_contents(&self) -> &BTreeMap<K, i32> {
        &self.table_of_contents
    }

    /// Flattened packet table, block 0 through the highest materialized block
    pub fn next_index_of_packets(&self) -> Vec<i32> {
        self.packets.to_sequence()
    }

    /// First free packet with an index greater than `start`
    pub fn next_empty_index(&self, start: usize) -> usize {
        self.packets.next_empty(start)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Write parity, sync and close the file
    pub fn dispose(&mut self) -> Result<()> {
        self.check_disposed()?;
        self.disposed = true;

        self.packets.set(0, END_OF_PACKETS);
        self.close()?;

        info!(
            path = %self.path.display(),
            records = self.count(),
            "Closed packet file"
        );
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(StoreError::Disposed("Drive"));
        }
        Ok(())
    }

    /// Parity bytes at offset 0; `None` if the file is too short to hold them
    fn read_parity(&self) -> Result<Option<[u8; PARITY_SIZE]>> {
        let mut packet = [0u8; PACKET_SIZE];
        let read = self.read_packet(0, &mut packet)?;
        if read < PARITY_SIZE {
            return Ok(None);
        }
        let mut parity = [0u8; PARITY_SIZE];
        parity.copy_from_slice(&packet[..PARITY_SIZE]);
        Ok(Some(parity))
    }

    fn link_chain(&mut self, chain: &[usize]) -> Result<()> {
        for pair in chain.windows(2) {
            let next = to_link(pair[1])?;
            self.packets.set(pair[0], next);
        }
        if let Some(&tail) = chain.last() {
            self.packets.set(tail, END_OF_PACKETS);
        }
        Ok(())
    }

    fn write_chain(&self, chain: &[usize], payload: &[u8]) -> Result<()> {
        for (&index, part) in chain.iter().zip(payload.chunks(PACKET_SIZE)) {
            self.write_packet(index, part)?;
        }
        Ok(())
    }

    /// Mark every packet of a chain empty. False if the head was already free.
    fn release_chain(&mut self, head: usize) -> bool {
        let mut index = head;
        loop {
            let next = self.packets.get(index);
            if next == EMPTY {
                return index != head;
            }
            self.packets.set(index, EMPTY);
            if next <= END_OF_PACKETS {
                return true;
            }
            index = next as usize;
        }
    }

    fn load_at(&self, head: usize) -> Result<V> {
        let bytes = self.read_chain(head).map_err(|e| match e {
            StoreError::Io(io) => {
                StoreError::Persistence(format!("Failed to read packet chain: {}", io))
            }
            other => other,
        })?;
        codec::decode(&bytes)
    }

    fn read_chain(&self, head: usize) -> Result<BytesMut> {
        let mut bytes = BytesMut::with_capacity(PACKET_SIZE);
        let mut packet = [0u8; PACKET_SIZE];
        let limit = self.packets.capacity();
        let mut index = head;

        for _ in 0..=limit {
            let read = self.read_packet(index, &mut packet)?;
            bytes.extend_from_slice(&packet[..read]);

            match self.packets.get(index) {
                END_OF_PACKETS => return Ok(bytes),
                next if next > 0 => index = next as usize,
                _ => {
                    return Err(StoreError::Persistence(format!(
                        "Chain from packet {} reaches unallocated packet {}",
                        head, index
                    )))
                }
            }
        }

        Err(StoreError::Persistence(format!(
            "Chain from packet {} does not terminate",
            head
        )))
    }

    /// Read up to one packet; short only at end of file
    fn read_packet(&self, index: usize, buf: &mut [u8; PACKET_SIZE]) -> Result<usize> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StoreError::Disposed("Drive"))?;
        file.seek(SeekFrom::Start(packet_offset(index)))?;

        let mut filled = 0;
        while filled < PACKET_SIZE {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn write_packet(&self, index: usize, data: &[u8]) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StoreError::Disposed("Drive"))?;
        file.seek(SeekFrom::Start(packet_offset(index)))?;
        file.write_all(data)?;
        Ok(())
    }
}

impl<K, V> Drive<K, V> {
    fn parity(&self) -> [u8; PARITY_SIZE] {
        parity::compute(
            self.table_of_contents.values().copied(),
            self.packets.values(),
        )
    }

    /// Store parity at offset 0, sync and release the file handle
    fn close(&mut self) -> std::io::Result<()> {
        let parity = self.parity();
        if let Some(mut file) = self.file.get_mut().take() {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&parity)?;
            file.sync_all()?;
        }
        Ok(())
    }
}

impl<K, V> Drop for Drive<K, V> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Err(e) = self.close() {
            error!(path = %self.path.display(), "Failed to close packet file: {}", e);
        }
    }
}

fn packet_offset(index: usize) -> u64 {
    index as u64 * PACKET_SIZE as u64
}

fn to_link(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| {
        StoreError::Persistence(format!("Packet index {} exceeds the table range", index))
    })
}
