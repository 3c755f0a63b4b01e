//! In-memory store
//!
//! A single ordered map behind a mutex. Useful as a drop-in for tests and as
//! the behavioral reference for [`DataStore`](super::DataStore).

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::record::{Comparer, Key, KeyFn, Record};

use super::range::{scan, FindRange};
use super::Store;

pub struct SimpleStore<K, V> {
    entries: Mutex<BTreeMap<K, V>>,
    key_fn: KeyFn<K, V>,
    comparer: Option<Comparer<K>>,
}

impl<K: Key, V: Record> SimpleStore<K, V> {
    pub fn new(key_fn: KeyFn<K, V>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            key_fn,
            comparer: None,
        }
    }

    /// Order `find` results with `comparer` instead of key order
    pub fn with_comparer(mut self, comparer: Comparer<K>) -> Self {
        self.comparer = Some(comparer);
        self
    }
}

impl<K: Key, V: Record> Store<K, V> for SimpleStore<K, V> {
    fn count(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }

    fn store(&self, value: V) -> Result<()> {
        let key = (self.key_fn)(&value);
        self.entries.lock().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn find(
        &self,
        predicate: &dyn Fn(&V) -> bool,
        range: Option<&FindRange<K>>,
        max_count: Option<usize>,
    ) -> Result<Vec<V>> {
        let limit = max_count.unwrap_or(usize::MAX);
        let entries = self.entries.lock();

        let found = match &self.comparer {
            None => scan(&*entries, range)
                .filter(|(_, value)| predicate(*value))
                .take(limit)
                .map(|(_, value)| value.clone())
                .collect(),
            Some(compare) => {
                let mut matched: Vec<(&K, &V)> = scan(&*entries, range)
                    .filter(|(_, value)| predicate(*value))
                    .collect();
                matched.sort_by(|(a, _), (b, _)| compare(a, b));
                matched
                    .into_iter()
                    .take(limit)
                    .map(|(_, value)| value.clone())
                    .collect()
            }
        };
        Ok(found)
    }

    fn remove(&self, key: &K) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
