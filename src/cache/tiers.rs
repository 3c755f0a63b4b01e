//! Alive and deadly tiers

use super::recency::RecencyList;

/// Most-recently-stored entries, bounded by `threshold`
pub struct AliveCache<K, V> {
    entries: RecencyList<K, V>,
    threshold: usize,
}

impl<K: Ord + Clone, V> AliveCache<K, V> {
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: RecencyList::new(),
            threshold,
        }
    }

    /// Insert or refresh `key` at the front. When the tier grows past its
    /// threshold, the least recently touched entry is returned for demotion.
    pub fn touch(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.entries.push_front(key, value);
        if self.entries.len() > self.threshold {
            return self.entries.pop_back();
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.entries.drain()
    }
}

/// A deadly entry and the staging version it was written with
#[derive(Debug, Clone)]
pub struct Staged<V> {
    pub value: V,
    pub version: u64,
}

/// Entries demoted from the alive tier, waiting for write-back
///
/// Every stage bumps the entry's version; write-back retires an entry only if
/// the version it flushed is still the current one.
pub struct DeadlyCache<K, V> {
    entries: RecencyList<K, Staged<V>>,
    next_version: u64,
}

impl<K: Ord + Clone, V: Clone> DeadlyCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RecencyList::new(),
            next_version: 0,
        }
    }

    /// Upsert an entry with a fresh version. Returns the tier size afterwards.
    pub fn stage(&mut self, key: K, value: V) -> usize {
        self.next_version += 1;
        let staged = Staged {
            value,
            version: self.next_version,
        };
        match self.entries.get_mut(&key) {
            Some(existing) => *existing = staged,
            None => {
                self.entries.push_front(key, staged);
            }
        }
        self.entries.len()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|staged| &staged.value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|staged| staged.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Copy of every entry with its version, for a flush outside the lock
    pub fn snapshot(&self) -> Vec<(K, u64, V)> {
        self.entries
            .iter()
            .map(|(key, staged)| (key.clone(), staged.version, staged.value.clone()))
            .collect()
    }

    /// Drop `key` if it is still at `version`. Returns whether it was dropped.
    pub fn retire(&mut self, key: &K, version: u64) -> bool {
        let current = self.entries.get(key).map(|staged| staged.version);
        if current == Some(version) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, staged)| (key, &staged.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.entries
            .drain()
            .into_iter()
            .map(|(key, staged)| (key, staged.value))
            .collect()
    }
}

impl<K: Ord + Clone, V: Clone> Default for DeadlyCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
