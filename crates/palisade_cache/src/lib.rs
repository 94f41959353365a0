// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two-tier TTL cache with stale-while-revalidate semantics.
//!
//! [`TieredCache`] combines a fast in-process tier with an optional durable,
//! origin-scoped key/value tier behind the [`DurableStore`] trait. Entries
//! carry a TTL and, when stale-while-revalidate is enabled, remain servable
//! for a second TTL-sized window after expiry so that callers can return
//! slightly outdated data immediately while refreshing in the background.
//!
//! The cache is a performance optimization, not a correctness requirement:
//! durable-tier failures (including capacity exhaustion) are absorbed
//! internally and never surface to callers.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use palisade_cache::{CacheOptions, TieredCache, generate_key};
//! use palisade_clock::Clock;
//!
//! let cache: TieredCache<String> =
//!     TieredCache::new(CacheOptions::default(), None, Clock::new());
//!
//! let key = generate_key("https://example.com/data", &Default::default());
//! cache.set(&key, "payload".to_string(), Duration::from_secs(60), true);
//!
//! let hit = cache.get(&key).unwrap();
//! assert!(!hit.is_stale);
//! ```

mod cache;
mod entry;
mod key;
mod store;

pub use cache::{
    CacheHit, CacheOptions, CacheSource, CacheStats, DEFAULT_KEY_PREFIX, DEFAULT_MAX_MEMORY_ENTRIES, TieredCache,
};
pub use entry::CacheEntry;
pub use key::{generate_key, hash_key};
pub use store::{DEFAULT_STORE_CAPACITY_BYTES, DurableStore, MemoryStore, StoreError};
