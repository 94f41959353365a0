// Copyright (c) Microsoft Corporation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use palisade_clock::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::entry::CacheEntry;
use crate::key::hash_key;
use crate::store::{DurableStore, StoreError};

/// Default maximum number of entries in the in-process tier.
pub const DEFAULT_MAX_MEMORY_ENTRIES: usize = 100;

/// Default physical-key prefix for the durable tier.
pub const DEFAULT_KEY_PREFIX: &str = "svc_cache_";

/// Which tier satisfied a cache read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSource {
    /// The in-process tier.
    Memory,
    /// The durable tier.
    Storage,
}

/// A successful cache read.
#[derive(Clone, Debug)]
pub struct CacheHit<T> {
    /// The cached payload.
    pub data: T,
    /// Which tier produced the value.
    pub source: CacheSource,
    /// Whether the entry is past its TTL (but still servable).
    pub is_stale: bool,
}

/// Aggregate cache statistics for health reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheStats {
    /// Entries currently held in the in-process tier.
    pub memory_entries: usize,
    /// Entries currently held in the durable tier under this cache's prefix.
    pub storage_entries: usize,
    /// Approximate durable footprint in kilobytes, rounded to two decimals.
    pub storage_size_kb: f64,
}

/// Construction options for [`TieredCache`].
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Physical-key prefix that namespaces this cache's durable entries.
    pub prefix: String,
    /// Capacity of the in-process tier, in entries.
    pub max_memory_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_owned(),
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
        }
    }
}

/// Two-tier key/value cache: a bounded in-process tier in front of an
/// optional durable tier.
///
/// Reads check the in-process tier first and promote durable hits into it.
/// Writes go to both tiers. The in-process tier evicts in insertion order:
/// a write at capacity drops the oldest-inserted entry first, even when it
/// overwrites an existing key, so re-writing the oldest key at capacity
/// re-inserts it at the back. Below capacity a re-write keeps the key's
/// position. All durable-tier failures are absorbed here.
#[derive(Debug)]
pub struct TieredCache<T> {
    memory: Mutex<MemoryTier<T>>,
    durable: Option<Arc<dyn DurableStore>>,
    prefix: String,
    max_memory_entries: usize,
    clock: Clock,
}

#[derive(Debug)]
struct MemoryTier<T> {
    entries: HashMap<String, CacheEntry<T>>,
    order: VecDeque<String>,
}

impl<T> MemoryTier<T> {
    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }
}

impl<T> TieredCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Creates a cache. Passing `None` for the durable store degrades to
    /// memory-tier-only caching.
    pub fn new(options: CacheOptions, durable: Option<Arc<dyn DurableStore>>, clock: Clock) -> Self {
        Self {
            memory: Mutex::new(MemoryTier {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            durable,
            prefix: options.prefix,
            max_memory_entries: options.max_memory_entries,
            clock,
        }
    }

    /// Looks up `key`, checking the in-process tier first and falling back
    /// to the durable tier. Entries past their servable window are lazily
    /// evicted and reported as absent.
    pub fn get(&self, key: &str) -> Option<CacheHit<T>> {
        let now = self.clock.now_millis();

        {
            let mut memory = self.memory.lock();
            if let Some(entry) = memory.entries.get(key) {
                if entry.is_valid(now) {
                    debug!(key, "cache hit (memory)");
                    return Some(CacheHit {
                        data: entry.data.clone(),
                        source: CacheSource::Memory,
                        is_stale: entry.is_stale(now),
                    });
                }
                memory.remove(key);
            }
        }

        if let Some(hit) = self.get_durable(key, now) {
            return Some(hit);
        }

        debug!(key, "cache miss");
        None
    }

    fn get_durable(&self, key: &str, now: u64) -> Option<CacheHit<T>> {
        let store = self.durable.as_ref()?;
        let physical = self.physical_key(key);

        let raw = match store.get(&physical) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                debug!(key, %err, "durable read failed, continuing without cache");
                return None;
            }
        };

        let Ok(entry) = serde_json::from_str::<CacheEntry<T>>(&raw) else {
            store.remove(&physical);
            return None;
        };

        if entry.is_valid(now) {
            let is_stale = entry.is_stale(now);
            let data = entry.data.clone();
            self.set_memory(key, entry);
            debug!(key, "cache hit (storage)");
            return Some(CacheHit {
                data,
                source: CacheSource::Storage,
                is_stale,
            });
        }

        store.remove(&physical);
        None
    }

    /// Writes `data` under `key` to both tiers.
    ///
    /// With `stale_while_revalidate` enabled the entry remains servable for
    /// `2 * ttl`; otherwise it expires at `ttl`.
    pub fn set(&self, key: &str, data: T, ttl: Duration, stale_while_revalidate: bool) {
        let entry = CacheEntry::new(data, self.clock.now_millis(), ttl, stale_while_revalidate);
        debug!(key, ttl_secs = ttl.as_secs(), "cache set");
        self.set_memory(key, entry.clone());
        self.set_durable(key, &entry);
    }

    fn set_memory(&self, key: &str, entry: CacheEntry<T>) {
        let mut memory = self.memory.lock();

        if memory.entries.len() >= self.max_memory_entries {
            if let Some(oldest) = memory.order.pop_front() {
                memory.entries.remove(&oldest);
            }
        }

        if memory.entries.insert(key.to_owned(), entry).is_none() {
            memory.order.push_back(key.to_owned());
        }
    }

    fn set_durable(&self, key: &str, entry: &CacheEntry<T>) {
        let Some(store) = self.durable.as_ref() else {
            return;
        };

        let Ok(serialized) = serde_json::to_string(entry) else {
            return;
        };
        let physical = self.physical_key(key);

        match store.set(&physical, &serialized) {
            Ok(()) => {}
            Err(StoreError::QuotaExceeded) => {
                self.prune_durable();
                if store.set(&physical, &serialized).is_err() {
                    debug!(key, "durable tier full, entry not persisted");
                }
            }
            Err(err) => debug!(key, %err, "durable write failed"),
        }
    }

    /// Drops roughly the oldest-written half of this cache's durable entries
    /// to make room after a quota failure.
    fn prune_durable(&self) {
        let Some(store) = self.durable.as_ref() else {
            return;
        };

        let mut aged: Vec<(String, u64)> = Vec::new();
        for physical in store.keys() {
            if !physical.starts_with(&self.prefix) {
                continue;
            }
            match store.get(&physical) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<T>>(&raw) {
                    Ok(entry) => aged.push((physical, entry.timestamp_ms)),
                    Err(_) => store.remove(&physical),
                },
                _ => store.remove(&physical),
            }
        }

        aged.sort_by_key(|(_, timestamp)| *timestamp);
        let victims = aged.len().div_ceil(2);
        for (physical, _) in aged.into_iter().take(victims) {
            store.remove(&physical);
        }
        debug!(pruned = victims, "pruned old durable cache entries");
    }

    /// Removes in-process entries whose logical key contains `pattern`.
    ///
    /// Durable physical keys are hashes, so they cannot be matched against a
    /// pattern; the durable tier drops all of this cache's entries instead.
    pub fn invalidate(&self, pattern: &str) {
        let mut count = 0usize;

        {
            let mut memory = self.memory.lock();
            let victims: Vec<String> = memory
                .entries
                .keys()
                .filter(|k| k.contains(pattern))
                .cloned()
                .collect();
            count += victims.len();
            for key in &victims {
                memory.remove(key);
            }
        }

        count += self.clear_durable();
        debug!(pattern, count, "invalidated cache entries");
    }

    /// Removes every entry from both tiers.
    pub fn clear(&self) {
        {
            let mut memory = self.memory.lock();
            memory.entries.clear();
            memory.order.clear();
        }
        let dropped = self.clear_durable();
        debug!(dropped, "cache cleared");
    }

    fn clear_durable(&self) -> usize {
        let Some(store) = self.durable.as_ref() else {
            return 0;
        };

        let mut count = 0usize;
        for physical in store.keys() {
            if physical.starts_with(&self.prefix) {
                store.remove(&physical);
                count += 1;
            }
        }
        count
    }

    /// Returns aggregate statistics for health reporting.
    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.memory.lock().entries.len();

        let mut storage_entries = 0usize;
        let mut storage_bytes = 0usize;
        if let Some(store) = self.durable.as_ref() {
            for physical in store.keys() {
                if !physical.starts_with(&self.prefix) {
                    continue;
                }
                storage_entries += 1;
                if let Ok(Some(raw)) = store.get(&physical) {
                    storage_bytes += raw.len();
                }
            }
        }

        #[expect(clippy::cast_precision_loss, reason = "statistics are approximate")]
        let storage_size_kb = (storage_bytes as f64 / 1024.0 * 100.0).round() / 100.0;

        CacheStats {
            memory_entries,
            storage_entries,
            storage_size_kb,
        }
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, hash_key(key))
    }
}
