//! Key ranges for `find`

use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};

/// A key interval used to narrow `find` scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindRange<K> {
    start: Bound<K>,
    end: Bound<K>,
}

impl<K> FindRange<K> {
    /// Every key.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// `from..=to`
    pub fn between(from: K, to: K) -> Self {
        Self {
            start: Bound::Included(from),
            end: Bound::Included(to),
        }
    }

    /// `from..`
    pub fn at_least(from: K) -> Self {
        Self {
            start: Bound::Included(from),
            end: Bound::Unbounded,
        }
    }

    /// `..=to`
    pub fn at_most(to: K) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Included(to),
        }
    }

    /// Arbitrary bounds.
    pub fn with_bounds(start: Bound<K>, end: Bound<K>) -> Self {
        Self { start, end }
    }
}

impl<K> RangeBounds<K> for FindRange<K> {
    fn start_bound(&self) -> Bound<&K> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&K> {
        self.end.as_ref()
    }
}

impl<K: Ord> FindRange<K> {
    /// True when no key can satisfy both bounds. `BTreeMap::range` panics on
    /// such input, so scans check this first.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }
}

/// True when `key` lies in `range`; `None` matches everything.
pub(crate) fn in_range<K: Ord>(range: Option<&FindRange<K>>, key: &K) -> bool {
    range.map_or(true, |r| r.contains(key))
}

/// Ordered scan of `map` restricted to `range`.
pub(crate) fn scan<'a, K: Ord, V>(
    map: &'a BTreeMap<K, V>,
    range: Option<&FindRange<K>>,
) -> Box<dyn Iterator<Item = (&'a K, &'a V)> + 'a> {
    match range {
        None => Box::new(map.iter()),
        Some(r) if r.is_empty() => Box::new(std::iter::empty()),
        Some(r) => Box::new(map.range::<K, _>((r.start_bound(), r.end_bound()))),
    }
}
