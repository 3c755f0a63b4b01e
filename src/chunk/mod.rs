//! Chunk Module
//!
//! One shard: two cache tiers and a tombstone set in front of a drive.
//!
//! ## Responsibilities
//! - Serve Store/Get/Remove/Find across alive → deadly → drive
//! - Demote least recently stored entries from alive to deadly
//! - Flush deadly entries on a background thread
//! - Flush everything and close the drive on dispose
//!
//! ## Concurrency Model
//!
//! Every tier owns its own lock; no lock spans all tiers, so a single `get`
//! observes tiers one at a time (eventual, not snapshot, consistency).
//!
//! - `alive`, `deadly`, `tombstones`: `Mutex`. When more than one is needed
//!   (demotion, store, remove) they are taken in that order, so a store and a
//!   remove of the same key never interleave.
//! - `drive`: `RwLock`. Loads share it; store/remove, write-back and dispose
//!   take it exclusively. It is never acquired while a tier lock is held.

mod writeback;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, trace};

use crate::cache::{AliveCache, DeadlyCache};
use crate::config::CacheLimits;
use crate::drive::Drive;
use crate::error::{Result, StoreError};
use crate::manage::ShardIndex;
use crate::record::{Key, Record};
use crate::store::range::{in_range, scan, FindRange};

use writeback::WriteBackWorker;

/// Where a key currently lives inside a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Alive,
    Deadly,
    Disk,
    Tombstoned,
    Absent,
}

/// State shared between a chunk and its write-back thread
pub(crate) struct Shared<K, V> {
    alive: Mutex<AliveCache<K, V>>,
    deadly: Mutex<DeadlyCache<K, V>>,
    tombstones: Mutex<BTreeSet<K>>,
    drive: RwLock<Drive<K, V>>,
    limits: CacheLimits,
    disposed: AtomicBool,
    write_back_cycles: AtomicU64,
}

/// A cached shard over one packet file
pub struct Chunk<K: Key, V: Record> {
    shared: Arc<Shared<K, V>>,
    worker: Mutex<Option<WriteBackWorker>>,
    path: PathBuf,
}

impl<K: Key, V: Record> Chunk<K, V> {
    /// Create a chunk over a new, empty packet file
    pub fn create(path: impl AsRef<Path>, limits: CacheLimits) -> Result<Self> {
        limits.validate()?;
        let drive = Drive::create(path)?;
        Self::start(drive, limits)
    }

    /// Reopen a chunk from its packet file and captured index metadata
    pub fn restore(
        path: impl AsRef<Path>,
        limits: CacheLimits,
        index: ShardIndex<K>,
    ) -> Result<Self> {
        limits.validate()?;
        let drive = Drive::open(path, index.table_of_contents, index.next_index_of_packets)?;
        Self::start(drive, limits)
    }

    fn start(drive: Drive<K, V>, limits: CacheLimits) -> Result<Self> {
        let path = drive.path().to_path_buf();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let shared = Arc::new(Shared {
            alive: Mutex::new(AliveCache::new(limits.alive_threshold)),
            deadly: Mutex::new(DeadlyCache::new()),
            tombstones: Mutex::new(BTreeSet::new()),
            drive: RwLock::new(drive),
            limits,
            disposed: AtomicBool::new(false),
            write_back_cycles: AtomicU64::new(0),
        });
        let worker =
            WriteBackWorker::spawn(format!("packetkv-writeback-{}", stem), Arc::clone(&shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            path,
        })
    }

    // =========================================================================
    // Store Operations
    // =========================================================================

    /// Number of live keys: cached or on disk, minus tombstoned
    pub fn count(&self) -> Result<usize> {
        self.check_disposed()?;

        let mut cached: BTreeSet<K> = self.shared.alive.lock().keys().cloned().collect();
        cached.extend(self.shared.deadly.lock().keys().cloned());
        let tombstones = self.shared.tombstones.lock().clone();

        let drive = self.shared.drive.read();
        let cache_only = cached
            .iter()
            .filter(|key| drive.head_of(key).is_none())
            .count();
        let buried = tombstones
            .iter()
            .filter(|key| cached.contains(key) || drive.head_of(key).is_some())
            .count();

        Ok((drive.count() + cache_only).saturating_sub(buried))
    }

    /// Insert or update a value in the alive tier
    pub fn add_or_update(&self, key: K, value: V) -> Result<()> {
        self.check_disposed()?;

        let deadly_len = {
            let mut alive = self.shared.alive.lock();
            let evicted = alive.touch(key.clone(), value);
            let mut deadly = self.shared.deadly.lock();
            deadly.remove(&key);
            let deadly_len = evicted.map(|(old_key, old_value)| {
                trace!(key = ?old_key, "Demoting to deadly tier");
                Self::add_to_deadly(&mut deadly, old_key, old_value)
            });
            self.shared.tombstones.lock().remove(&key);
            deadly_len
        };

        if deadly_len.map_or(false, |len| len > self.shared.limits.deadly_threshold) {
            self.notify_write_back();
        }
        Ok(())
    }

    fn add_to_deadly(deadly: &mut DeadlyCache<K, V>, key: K, value: V) -> usize {
        deadly.stage(key, value)
    }

    /// Look a key up: tombstones, alive, deadly, then the drive
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.check_disposed()?;
        self.lookup(key, None)
    }

    /// Tombstone a key. Disk space is reclaimed lazily.
    ///
    /// Returns true if the key was live, false if it was absent or already
    /// removed.
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.check_disposed()?;

        if let Some(removed) = self.bury(key, false) {
            return Ok(removed);
        }
        // Not cached: an entry leaves deadly only once it is on disk, so the
        // drive answers for it now.
        let on_disk = self.shared.drive.read().head_of(key).is_some();
        Ok(self.bury(key, on_disk).unwrap_or(false))
    }

    /// Purge `key` from both tiers and tombstone it if it was live.
    /// `None` when it is neither cached, tombstoned, nor `on_disk`.
    fn bury(&self, key: &K, on_disk: bool) -> Option<bool> {
        let mut alive = self.shared.alive.lock();
        let mut deadly = self.shared.deadly.lock();
        let mut tombstones = self.shared.tombstones.lock();

        if tombstones.contains(key) {
            return Some(false);
        }
        let in_alive = alive.remove(key).is_some();
        let in_deadly = deadly.remove(key).is_some();
        if in_alive || in_deadly || on_disk {
            tombstones.insert(key.clone());
            return Some(true);
        }
        None
    }

    // =========================================================================
    // Find Support
    // =========================================================================

    /// Cached entries in `range` that satisfy `predicate`, alive tier first
    pub fn find_caches(
        &self,
        predicate: &dyn Fn(&V) -> bool,
        range: Option<&FindRange<K>>,
    ) -> Result<Vec<(K, V)>> {
        self.check_disposed()?;
        let tombstones = self.shared.tombstones.lock().clone();
        let keep = |key: &K, value: &V| {
            in_range(range, key) && !tombstones.contains(key) && predicate(value)
        };

        let mut found = Vec::new();
        {
            let alive = self.shared.alive.lock();
            found.extend(
                alive
                    .iter()
                    .filter(|(k, v)| keep(*k, *v))
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        {
            let deadly = self.shared.deadly.lock();
            found.extend(
                deadly
                    .iter()
                    .filter(|(k, v)| keep(*k, *v))
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        Ok(found)
    }

    /// Table of contents entries in `range` for keys that are neither cached
    /// nor tombstoned
    pub fn index_entries(&self, range: Option<&FindRange<K>>) -> Result<Vec<(K, i32)>> {
        self.check_disposed()?;
        let mut shadowed = self.shared.tombstones.lock().clone();
        shadowed.extend(self.shared.alive.lock().keys().cloned());
        shadowed.extend(self.shared.deadly.lock().keys().cloned());

        let drive = self.shared.drive.read();
        Ok(scan(drive.table_of_contents(), range)
            .filter(|(key, head)| **head > 0 && !shadowed.contains(*key))
            .map(|(key, &head)| (key.clone(), head))
            .collect())
    }

    /// Resolve an entry from [`index_entries`](Self::index_entries)
    ///
    /// Goes through the tiers like `get`, but reads the drive at `index`
    /// directly while the table of contents still points there.
    pub fn load_indexed(&self, key: &K, index: i32) -> Result<Option<V>> {
        self.check_disposed()?;
        self.lookup(key, Some(index))
    }

    /// Load the chain at `index` from the drive, bypassing every tier
    pub fn get_from_drive(&self, index: i32) -> Result<V> {
        self.check_disposed()?;
        self.shared.drive.read().load_from_exact_index(index)
    }

    fn lookup(&self, key: &K, index: Option<i32>) -> Result<Option<V>> {
        if self.shared.tombstones.lock().contains(key) {
            return Ok(None);
        }

        let alive_hit = self.shared.alive.lock().get(key).cloned();
        if alive_hit.is_some() {
            return Ok(alive_hit);
        }

        let deadly_hit = self.shared.deadly.lock().get(key).cloned();
        if deadly_hit.is_some() {
            return Ok(deadly_hit);
        }

        let drive = self.shared.drive.read();
        match (index, drive.head_of(key)) {
            (Some(index), Some(head)) if index == head => {
                drive.load_from_exact_index(index).map(Some)
            }
            _ => drive.try_load(key),
        }
    }

    // =========================================================================
    // Metadata & Diagnostics
    // =========================================================================

    /// Snapshot of the drive's index metadata. Valid after dispose too.
    pub fn shard_index(&self) -> ShardIndex<K> {
        let drive = self.shared.drive.read();
        ShardIndex {
            table_of_contents: drive.table_of_contents().clone(),
            next_index_of_packets: drive.next_index_of_packets(),
        }
    }

    /// Which tier currently answers for `key`
    pub fn residency(&self, key: &K) -> Residency {
        if self.shared.tombstones.lock().contains(key) {
            return Residency::Tombstoned;
        }
        if self.shared.alive.lock().contains(key) {
            return Residency::Alive;
        }
        if self.shared.deadly.lock().contains(key) {
            return Residency::Deadly;
        }
        if self.shared.drive.read().head_of(key).is_some() {
            return Residency::Disk;
        }
        Residency::Absent
    }

    pub fn alive_len(&self) -> usize {
        self.shared.alive.lock().len()
    }

    pub fn deadly_len(&self) -> usize {
        self.shared.deadly.lock().len()
    }

    /// Completed write-back cycles since the chunk started
    pub fn write_back_cycles(&self) -> u64 {
        self.shared.write_back_cycles.load(Ordering::Acquire)
    }

    pub fn limits(&self) -> CacheLimits {
        self.shared.limits
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Compact the packet file. Not supported.
    pub fn optimize(&self) -> Result<()> {
        self.check_disposed()?;
        self.shared.drive.write().optimize()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop write-back, flush both tiers, reclaim tombstones, close the drive
    pub fn dispose(&self) -> Result<()> {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Disposed("Chunk"));
        }

        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }

        // Deadly first: alive holds the newer value if both ever disagree.
        let mut pending = self.shared.deadly.lock().drain();
        pending.extend(self.shared.alive.lock().drain());
        let tombstones = std::mem::take(&mut *self.shared.tombstones.lock());

        let mut drive = self.shared.drive.write();
        let mut first_error = None;
        let flushed = pending.len();
        for (key, value) in pending {
            if let Err(e) = drive.store(key, &value) {
                first_error.get_or_insert(e);
            }
        }
        let reclaimed = tombstones.len();
        for key in tombstones {
            if let Err(e) = drive.remove(&key) {
                first_error.get_or_insert(e);
            }
        }
        let closed = drive.dispose();

        info!(
            path = %self.path.display(),
            flushed,
            reclaimed,
            "Chunk disposed"
        );

        match first_error {
            Some(e) => Err(e),
            None => closed,
        }
    }

    fn notify_write_back(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.notify();
        }
    }

    fn check_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed("Chunk"));
        }
        Ok(())
    }
}

impl<K: Key, V: Record> Drop for Chunk<K, V> {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Err(e) = self.dispose() {
            error!(path = %self.path.display(), "Failed to dispose chunk: {}", e);
        }
    }
}
