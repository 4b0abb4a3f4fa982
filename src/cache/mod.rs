//! Time-bounded caching for capability and menu lookups.
//!
//! This module provides a storage-agnostic TTL cache that:
//! - Namespaces entries with a key prefix so caches can share one store
//! - Stamps every entry with its write time and drops it once expired
//! - Treats corrupt entries and storage failures as plain misses

mod storage;
mod ttl;

pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use ttl::{CacheEntry, CacheRead, Clock, Invalidate, SystemClock, TtlCache, DEFAULT_TTL_MS};

#[cfg(test)]
pub(crate) use ttl::testing;
