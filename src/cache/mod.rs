//! Cache Module
//!
//! In-memory tiers that sit in front of a drive.
//!
//! ## Responsibilities
//! - Alive tier: bounded LRU of the most recently stored records
//! - Deadly tier: records demoted from alive, waiting for write-back
//! - O(log n) key lookup and O(1) recency reordering
//!
//! ## Data Structure Choice
//! An arena of linked nodes addressed by generational handles, indexed by a
//! BTreeMap from key to handle:
//! - Ordered keys (range scans, deterministic iteration)
//! - No aliased node references; a stale handle simply fails to resolve

mod recency;
mod tiers;

pub use recency::{Handle, Iter, RecencyList};
pub use tiers::{AliveCache, DeadlyCache, Staged};
