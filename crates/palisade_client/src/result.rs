// Copyright (c) Microsoft Corporation.

use std::collections::HashMap;

use palisade_breaker::BreakerStatus;
use palisade_cache::{CacheSource, CacheStats};
use serde_json::Value;

/// Which path produced a request's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOrigin {
    /// A fresh network response; not served from cache.
    Network,
    /// The in-process cache tier.
    Memory,
    /// The durable cache tier.
    Storage,
    /// Any cached value served because the circuit breaker denied the call.
    Fallback,
    /// Any cached value served after all retries were exhausted.
    StaleFallback,
}

impl From<CacheSource> for CacheOrigin {
    fn from(source: CacheSource) -> Self {
        match source {
            CacheSource::Memory => Self::Memory,
            CacheSource::Storage => Self::Storage,
        }
    }
}

/// The uniform envelope returned to every caller, regardless of which path
/// produced the data. Self-describing: no side effect of the pipeline is
/// needed to interpret it.
#[derive(Clone, Debug)]
pub struct RequestResult {
    /// The payload. JSON responses are parsed; text responses are carried
    /// as a JSON string value.
    pub data: Value,
    /// Which path produced the payload.
    pub from_cache: CacheOrigin,
    /// Whether the payload was past its TTL when served.
    pub stale: bool,
    /// Whether the circuit breaker denied the network call.
    pub circuit_open: bool,
    /// Zero-based attempt index that succeeded; `None` off the network path.
    pub attempt: Option<u32>,
    /// The last network error, when a fallback value was served instead of
    /// propagating it.
    pub error: Option<String>,
}

/// Aggregate diagnostics for the health panel.
#[derive(Clone, Debug)]
pub struct HealthStatus {
    /// Per-service breaker snapshots.
    pub circuit_breakers: HashMap<String, BreakerStatus>,
    /// Number of circuits currently open.
    pub open_circuits: usize,
    /// Number of deduplicated network executions currently in flight.
    pub in_flight_requests: usize,
    /// Cache tier statistics.
    pub cache_stats: CacheStats,
}
