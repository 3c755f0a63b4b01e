//! Sharded persistent store
//!
//! Partitions keys across a fixed set of [`Chunk`]s, one packet file each:
//!
//! ```text
//!                 store / get / remove
//!                         │
//!              shard = |xxh3(key)| mod N
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!     ┌─────────┐    ┌─────────┐    ┌─────────┐
//!     │ Chunk 0 │    │ Chunk 1 │    │Chunk N-1│
//!     │  0.db   │    │  1.db   │    │ N-1.db  │
//!     └─────────┘    └─────────┘    └─────────┘
//! ```
//!
//! Placement uses xxh3 rather than `std`'s randomly seeded hasher: a restored
//! store must route every key to the shard that wrote it.

use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

use crate::chunk::Chunk;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::manage::ManageData;
use crate::record::{Comparer, Key, KeyFn, Record};

use super::range::FindRange;
use super::Store;

/// Packet file of `shard` inside the configured data directory
pub fn shard_path(config: &Config, shard: usize) -> PathBuf {
    config.data_dir.join(format!("{}.db", shard))
}

/// Shard files of `config` that already exist on disk.
///
/// [`DataStore::create`] truncates these; callers without manage data for
/// them should refuse to create over them.
pub fn existing_shard_files(config: &Config) -> Vec<PathBuf> {
    (0..config.chunk_count)
        .map(|shard| shard_path(config, shard))
        .filter(|path| path.exists())
        .collect()
}

/// A `find` hit before it is materialized
enum Candidate<V> {
    /// Value already read from a cache tier (predicate applied)
    Cached(V),

    /// Disk entry still to be loaded and filtered
    Indexed { shard: usize, index: i32 },
}

/// Sharded store over packet files
pub struct DataStore<K: Key, V: Record> {
    config: Config,
    chunks: Vec<Chunk<K, V>>,
    key_fn: KeyFn<K, V>,
    comparer: Option<Comparer<K>>,
}

impl<K: Key, V: Record> DataStore<K, V> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a store with fresh (truncated) shard files
    pub fn create(config: Config, key_fn: KeyFn<K, V>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let chunks = (0..config.chunk_count)
            .map(|shard| Chunk::create(shard_path(&config, shard), config.cache))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            data_dir = %config.data_dir.display(),
            shards = chunks.len(),
            "Created data store"
        );

        Ok(Self {
            config,
            chunks,
            key_fn,
            comparer: None,
        })
    }

    /// Reopen shard files with index metadata from [`manage_data`](Self::manage_data)
    ///
    /// Metadata for a different number of shards is rejected before any file
    /// is touched.
    pub fn restore(
        config: Config,
        key_fn: KeyFn<K, V>,
        manage_data: ManageData<K>,
    ) -> Result<Self> {
        config.validate()?;
        if manage_data.len() != config.chunk_count {
            return Err(StoreError::Configuration(format!(
                "Manage data describes {} shards but chunk_count is {}",
                manage_data.len(),
                config.chunk_count
            )));
        }

        let chunks = manage_data
            .into_iter()
            .enumerate()
            .map(|(shard, index)| {
                Chunk::restore(shard_path(&config, shard), config.cache, index)
            })
            .collect::<Result<Vec<_>>>()?;

        let records: usize = chunks
            .iter()
            .map(|chunk| chunk.count())
            .sum::<Result<usize>>()?;
        info!(
            data_dir = %config.data_dir.display(),
            shards = chunks.len(),
            records,
            "Restored data store"
        );

        Ok(Self {
            config,
            chunks,
            key_fn,
            comparer: None,
        })
    }

    /// Order `find` results with `comparer` instead of key order
    pub fn with_comparer(mut self, comparer: Comparer<K>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    // =========================================================================
    // Sharding
    // =========================================================================

    /// Shard index that owns `key`
    pub fn shard_of(&self, key: &K) -> usize {
        let mut hasher = Xxh3::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as i64;
        (hash.unsigned_abs() % self.chunks.len() as u64) as usize
    }

    fn chunk_for(&self, key: &K) -> &Chunk<K, V> {
        &self.chunks[self.shard_of(key)]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Shard `index`, for diagnostics
    pub fn chunk(&self, index: usize) -> Option<&Chunk<K, V>> {
        self.chunks.get(index)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Index metadata of every shard, in shard order
    pub fn manage_data(&self) -> ManageData<K> {
        self.chunks.iter().map(Chunk::shard_index).collect()
    }

    /// Dispose every shard in parallel and wait for all of them
    ///
    /// Every shard is attempted; the first failure is reported.
    pub fn dispose(&self) -> Result<()> {
        let outcomes = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = self
                .chunks
                .iter()
                .map(|chunk| scope.spawn(move |_| chunk.dispose()))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(StoreError::Persistence(
                            "Shard dispose thread panicked".to_string(),
                        ))
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| StoreError::Persistence("Dispose scope panicked".to_string()))?;

        info!(
            data_dir = %self.config.data_dir.display(),
            shards = outcomes.len(),
            "Data store disposed"
        );

        outcomes.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Dispose and hand back the metadata needed for [`restore`](Self::restore)
    pub fn close(self) -> Result<ManageData<K>> {
        self.dispose()?;
        Ok(self.manage_data())
    }

    /// Compact shard files. Not supported.
    pub fn optimize(&self) -> Result<()> {
        for chunk in &self.chunks {
            chunk.optimize()?;
        }
        Ok(())
    }

    fn resolve(&self, key: &K, candidate: Candidate<V>) -> Result<Option<V>> {
        match candidate {
            Candidate::Cached(value) => Ok(Some(value)),
            Candidate::Indexed { shard, index } => self.chunks[shard].load_indexed(key, index),
        }
    }
}

impl<K: Key, V: Record> Store<K, V> for DataStore<K, V> {
    fn count(&self) -> Result<usize> {
        self.chunks.iter().map(|chunk| chunk.count()).sum()
    }

    fn store(&self, value: V) -> Result<()> {
        let key = (self.key_fn)(&value);
        self.chunk_for(&key).add_or_update(key, value)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.chunk_for(key).get(key)
    }

    fn find(
        &self,
        predicate: &dyn Fn(&V) -> bool,
        range: Option<&FindRange<K>>,
        max_count: Option<usize>,
    ) -> Result<Vec<V>> {
        let limit = max_count.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Cache hits are collected first so they shadow disk entries.
        let mut candidates: BTreeMap<K, Candidate<V>> = BTreeMap::new();
        for (shard, chunk) in self.chunks.iter().enumerate() {
            for (key, value) in chunk.find_caches(predicate, range)? {
                candidates.entry(key).or_insert(Candidate::Cached(value));
            }
            for (key, index) in chunk.index_entries(range)? {
                candidates
                    .entry(key)
                    .or_insert(Candidate::Indexed { shard, index });
            }
        }

        let mut ordered: Vec<(K, Candidate<V>)> = candidates.into_iter().collect();
        if let Some(compare) = &self.comparer {
            ordered.sort_by(|(a, _), (b, _)| compare(a, b));
        }

        let mut found = Vec::new();
        for (key, candidate) in ordered {
            let indexed = matches!(candidate, Candidate::Indexed { .. });
            match self.resolve(&key, candidate)? {
                Some(value) if !indexed || predicate(&value) => found.push(value),
                _ => {}
            }
            if found.len() >= limit {
                break;
            }
        }
        Ok(found)
    }

    fn remove(&self, key: &K) -> Result<bool> {
        self.chunk_for(key).remove(key)
    }
}

impl<K: Key, V: Record> std::fmt::Debug for DataStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("data_dir", &self.config.data_dir)
            .field("chunk_count", &self.chunks.len())
            .field("ordered", &self.comparer.is_some())
            .finish()
    }
}
