// Copyright (c) Microsoft Corporation.

use std::collections::HashMap;
use std::fmt::Debug;

use parking_lot::Mutex;

/// Default capacity of [`MemoryStore`], sized like a browser origin quota.
pub const DEFAULT_STORE_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

/// Failure of a durable-tier operation.
///
/// These errors never escape the cache: the cache recovers locally
/// (prune-and-retry for quota, log-and-continue otherwise).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store's capacity is exhausted.
    #[error("store capacity exhausted")]
    QuotaExceeded,

    /// The backing store failed in some other way.
    #[error("store operation failed: {0}")]
    Backend(String),
}

/// A synchronous, origin-scoped key/value store with finite capacity.
///
/// This is the durable tier's substrate. Implementations are expected to be
/// small and dumb: string keys, string values, no TTL awareness. Entry
/// lifecycle is entirely the cache's business. In execution contexts with no
/// durable substrate, the cache simply runs without one.
pub trait DurableStore: Debug + Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`. Removing an absent key is not
    /// an error.
    fn remove(&self, key: &str);

    /// Returns all keys currently present in the store.
    fn keys(&self) -> Vec<String>;

    /// Returns the number of entries in the store.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-process [`DurableStore`] with a byte budget.
///
/// Used in tests and in deployments without an origin-scoped substrate. The
/// budget counts key and value bytes, which is close enough to how real
/// quota-limited stores account.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    capacity_bytes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    used_bytes: usize,
}

impl MemoryStore {
    /// Creates a store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY_BYTES)
    }

    /// Creates a store with the given byte budget.
    #[must_use]
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity_bytes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        let previous = inner.entries.get(key).map_or(0, |v| key.len() + v.len());
        let projected = inner.used_bytes - previous + key.len() + value.len();
        if projected > self.capacity_bytes {
            return Err(StoreError::QuotaExceeded);
        }

        inner.entries.insert(key.to_owned(), value.to_owned());
        inner.used_bytes = projected;
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.entries.remove(key) {
            inner.used_bytes -= key.len() + value.len();
        }
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let store = MemoryStore::new();

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k");
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn set_past_capacity_fails_with_quota_exceeded() {
        let store = MemoryStore::with_capacity(10);

        store.set("abc", "def").unwrap();
        assert_eq!(store.set("long-key", "long-value"), Err(StoreError::QuotaExceeded));

        // the original entry is untouched
        assert_eq!(store.get("abc").unwrap().as_deref(), Some("def"));
    }

    #[test]
    fn overwriting_reclaims_the_previous_entry_budget() {
        let store = MemoryStore::with_capacity(12);

        store.set("k", "aaaaaaaaaaa").unwrap();
        // same key, same size: fits because the old value is replaced
        store.set("k", "bbbbbbbbbbb").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("bbbbbbbbbbb"));
    }
}
