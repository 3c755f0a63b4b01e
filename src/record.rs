//! Record contract
//!
//! What a value and its key must provide to be stored. Values are encoded
//! with bincode, so any serde-serializable type qualifies.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A storable value.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A record key: totally ordered (ToC and cache indexes), hashable (shard
/// placement) and serializable (checkpointed table of contents).
pub trait Key:
    Ord + Hash + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Key for T where
    T: Ord + Hash + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Extracts the key of a value.
pub type KeyFn<K, V> = Arc<dyn Fn(&V) -> K + Send + Sync>;

/// Optional ordering applied to `find` results.
pub type Comparer<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;
