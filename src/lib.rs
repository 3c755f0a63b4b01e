//! # packetkv
//!
//! A sharded key-value store for locally cached records, with:
//! - Two in-memory tiers per shard (alive LRU, deadly write-back staging)
//! - Background write-back of demoted records
//! - Fixed 256-byte packet files with chained, compressed payloads
//! - Parity-checked index metadata that the caller persists between runs
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DataStore<K, V>                         │
//! │              shard = |xxh3(key)| mod chunk_count            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ (one per shard)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Chunk<K, V>                           │
//! │  tombstones ─► alive (LRU) ─► deadly (staged) ─► drive      │
//! └──────────┬─────────────────────────────┬────────────────────┘
//!            │ evict                        │ write-back thread
//!            ▼                              ▼
//!     ┌─────────────┐              ┌────────────────┐
//!     │   Deadly    │─────────────►│     Drive      │
//!     │  (Mutex)    │              │   (RwLock)     │
//!     └─────────────┘              │  <shard>.db    │
//!                                  └────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod record;

pub mod cache;
pub mod chunk;
pub mod drive;
pub mod manage;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use chunk::{Chunk, Residency};
pub use config::{CacheLimits, Config};
pub use error::{Result, StoreError};
pub use manage::{ManageData, ShardIndex};
pub use record::{Comparer, Key, KeyFn, Record};
pub use store::{DataStore, FindRange, SimpleStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of packetkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
