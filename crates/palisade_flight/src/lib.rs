// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Collapses concurrent identical async requests into a single execution.
//!
//! [`Flight`] keeps a ledger of pending operations keyed by request
//! identity. The first caller for a key starts the operation; callers that
//! arrive while it is in flight receive a handle to the same pending
//! execution and observe a clone of its eventual result. The ledger entry is
//! removed when the execution settles — success or failure — so a later call
//! with the same key starts a fresh execution.
//!
//! The result type is typically a `Result`, so failures are broadcast to all
//! waiters as values; there is no separate error path to orphan ledger
//! entries.
//!
//! # Example
//!
//! ```
//! use palisade_flight::Flight;
//!
//! # async fn example() {
//! let flight: Flight<String, u32> = Flight::new();
//!
//! // Concurrent calls with the same key share one execution.
//! let value = flight.work("quotes".to_owned(), || async { 42 }).await;
//! assert_eq!(value, 42);
//! # }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;

type Ledger<K, T> = Arc<Mutex<HashMap<K, Shared<BoxFuture<'static, T>>>>>;

/// A space in which units of work are executed with duplicate suppression.
#[derive(Debug)]
pub struct Flight<K, T> {
    ledger: Ledger<K, T>,
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            ledger: Arc::default(),
        }
    }
}

impl<K, T> Flight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty flight group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes `factory`'s operation under `key`, unless an identical
    /// operation is already in flight, in which case the existing pending
    /// execution is returned and `factory`'s future is dropped unpolled.
    ///
    /// The returned future is lazy; the underlying operation makes progress
    /// only while at least one caller awaits it.
    pub fn work<F, Fut>(&self, key: K, factory: F) -> Shared<BoxFuture<'static, T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut ledger = self.ledger.lock();
        if let Some(pending) = ledger.get(&key) {
            return pending.clone();
        }

        let operation = factory();
        let cleanup_ledger = Arc::clone(&self.ledger);
        let cleanup_key = key.clone();
        let shared = async move {
            let value = operation.await;
            // settle-time cleanup runs exactly once, before the result is
            // broadcast, on both success and failure values
            cleanup_ledger.lock().remove(&cleanup_key);
            value
        }
        .boxed()
        .shared();

        ledger.insert(key, shared.clone());
        shared
    }

    /// Whether an operation is currently in flight under `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.ledger.lock().contains_key(key)
    }

    /// Number of operations currently in flight.
    pub fn len(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Whether no operations are in flight.
    pub fn is_empty(&self) -> bool {
        self.ledger.lock().is_empty()
    }

    /// The keys of all in-flight operations, for diagnostics.
    pub fn keys(&self) -> Vec<K> {
        self.ledger.lock().keys().cloned().collect()
    }

    /// Drops all ledger entries. In-flight executions keep running for
    /// callers already holding handles, but new callers start fresh.
    pub fn clear(&self) {
        self.ledger.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn concurrent_calls_with_the_same_key_execute_once() {
        let flight: Flight<&str, usize> = Flight::new();
        let executions = Arc::new(AtomicUsize::new(0));

        let first = flight.work("key", {
            let executions = Arc::clone(&executions);
            move || async move {
                executions.fetch_add(1, Ordering::SeqCst);
                7
            }
        });
        let second = flight.work("key", {
            let executions = Arc::clone(&executions);
            move || async move {
                executions.fetch_add(1, Ordering::SeqCst);
                13
            }
        });

        let (a, b) = tokio::join!(first, second);

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(a, 7);
        assert_eq!(b, 7);
    }

    #[tokio::test]
    async fn different_keys_execute_independently() {
        let flight: Flight<&str, &str> = Flight::new();

        let (a, b) = tokio::join!(
            flight.work("a", || async { "a" }),
            flight.work("b", || async { "b" })
        );

        assert_eq!((a, b), ("a", "b"));
    }

    #[tokio::test]
    async fn settled_key_starts_a_fresh_execution() {
        let flight: Flight<&str, usize> = Flight::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let executions = Arc::clone(&executions);
            let value = flight
                .work("key", move || async move {
                    executions.fetch_add(1, Ordering::SeqCst)
                })
                .await;
            drop(value);
        }

        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn failure_results_clean_up_the_ledger() {
        let flight: Flight<&str, Result<(), String>> = Flight::new();

        let outcome = flight
            .work("key", || async { Err::<(), _>("boom".to_owned()) })
            .await;

        assert_eq!(outcome, Err("boom".to_owned()));
        assert!(!flight.contains(&"key"));
        assert_eq!(flight.len(), 0);
    }

    #[tokio::test]
    async fn ledger_tracks_in_flight_work() {
        let flight: Flight<&str, ()> = Flight::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let pending = flight.work("key", move || async move {
            let _ = rx.await;
        });

        assert!(flight.contains(&"key"));
        assert_eq!(flight.keys(), vec!["key"]);

        let _ = tx.send(());
        pending.await;

        assert!(flight.is_empty());
    }
}
