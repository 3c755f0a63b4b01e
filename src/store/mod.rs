//! Store Module
//!
//! The keyed store contract and its two implementations.
//!
//! ## Implementations
//! - [`DataStore`]: sharded, cached, file-backed
//! - [`SimpleStore`]: in-memory ordered map, same observable behavior
//!
//! Keys are never passed in on store; each store derives them from the value
//! with its [`KeyFn`](crate::record::KeyFn).

pub mod persistent;
pub mod range;
pub mod simple;

pub use persistent::DataStore;
pub use range::FindRange;
pub use simple::SimpleStore;

use crate::error::Result;
use crate::record::{Key, Record};

/// Keyed record storage
pub trait Store<K: Key, V: Record> {
    /// Number of live records
    fn count(&self) -> Result<usize>;

    /// Insert or replace the record under its derived key
    fn store(&self, value: V) -> Result<()>;

    /// Record under `key`, or `None`
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Records in `range` matching `predicate`, at most `max_count` of them.
    ///
    /// Ordered by the store's comparer when one is set, by key otherwise.
    fn find(
        &self,
        predicate: &dyn Fn(&V) -> bool,
        range: Option<&FindRange<K>>,
        max_count: Option<usize>,
    ) -> Result<Vec<V>>;

    /// Remove the record under `key`. Returns whether it existed.
    fn remove(&self, key: &K) -> Result<bool>;
}
