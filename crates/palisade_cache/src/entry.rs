// Copyright (c) Microsoft Corporation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single cached value together with its lifecycle timestamps.
///
/// An entry moves through three phases relative to a current time `now`:
///
/// - *fresh* while `now <= timestamp + ttl`;
/// - *stale but servable* while `timestamp + ttl < now < stale_until`, which
///   only exists when the entry was written with stale-while-revalidate
///   enabled (`stale_until = timestamp + 2*ttl`, otherwise `timestamp + ttl`);
/// - *expired* from `stale_until` onward, at which point the entry must be
///   treated as absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload.
    pub data: T,

    /// Write time, in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,

    /// Freshness window length in milliseconds.
    pub ttl_ms: u64,

    /// The instant past which the entry is no longer servable.
    pub stale_until_ms: u64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry written at `now_ms` with the given TTL.
    pub fn new(data: T, now_ms: u64, ttl: Duration, stale_while_revalidate: bool) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let window = if stale_while_revalidate {
            ttl_ms.saturating_mul(2)
        } else {
            ttl_ms
        };

        Self {
            data,
            timestamp_ms: now_ms,
            ttl_ms,
            stale_until_ms: now_ms.saturating_add(window),
        }
    }

    /// Whether the entry is still servable at `now_ms`.
    pub fn is_valid(&self, now_ms: u64) -> bool {
        now_ms < self.stale_until_ms
    }

    /// Whether the entry is past its TTL at `now_ms`. A stale entry may
    /// still be valid; see the type-level docs.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms > self.timestamp_ms.saturating_add(self.ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_within_ttl() {
        let entry = CacheEntry::new("x", 1000, Duration::from_millis(500), true);

        assert!(entry.is_valid(1000));
        assert!(!entry.is_stale(1000));
        assert!(!entry.is_stale(1500));
    }

    #[test]
    fn stale_but_valid_within_doubled_window() {
        let entry = CacheEntry::new("x", 1000, Duration::from_millis(500), true);

        assert!(entry.is_stale(1501));
        assert!(entry.is_valid(1999));
        assert!(!entry.is_valid(2000));
    }

    #[test]
    fn without_stale_while_revalidate_expiry_coincides_with_ttl() {
        let entry = CacheEntry::new("x", 1000, Duration::from_millis(500), false);

        assert!(entry.is_valid(1499));
        assert!(!entry.is_valid(1500));
    }
}
