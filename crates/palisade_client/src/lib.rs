// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resilient service client for unreliable, rate-limited upstream APIs.
//!
//! This crate is the orchestration layer of the palisade workspace: it makes
//! inconsistently available third-party data services look uniform and
//! forgiving to callers, while protecting both sides from the effects of
//! failure. Every call flows through the same pipeline:
//!
//! 1. policy lookup in the static [`ServiceRegistry`];
//! 2. a two-tier cache read, serving fresh values immediately and stale
//!    values with a detached background refresh;
//! 3. a per-service circuit-breaker gate, falling back to cached data of any
//!    staleness when the circuit is open;
//! 4. collapsing of concurrent identical requests onto one execution;
//! 5. the network call itself, with bounded per-attempt timeouts and
//!    exponential-backoff retries, falling back to stale cache data when the
//!    network ultimately fails.
//!
//! Whatever path produced the data, the caller receives the same
//! self-describing [`RequestResult`] envelope. Single fetch failures should
//! therefore never take down a whole dashboard: panels render whatever
//! cached or fallback data is available and key a local "failed to load"
//! state off [`RequestResult::error`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use palisade_client::{HyperTransport, RequestOptions, ServiceClient, ServiceRegistry};
//! use palisade_clock::Clock;
//!
//! # async fn example() -> Result<(), palisade_client::ClientError> {
//! let client = ServiceClient::new(
//!     ServiceRegistry::builtin(),
//!     Arc::new(HyperTransport::new()),
//!     None,
//!     Clock::new(),
//! );
//!
//! let quakes = client
//!     .request(
//!         "usgs",
//!         "/earthquakes/feed/v1.0/summary/4.5_day.geojson",
//!         RequestOptions::default(),
//!     )
//!     .await?;
//! println!("served from {:?}", quakes.from_cache);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod errors;
mod options;
mod result;
mod rnd;
mod transport;

pub use client::ServiceClient;
pub use config::{CORS_PROXY_SERVICE, CachePolicy, ServiceConfig, ServiceRegistry};
pub use errors::ClientError;
pub use options::{RequestOptions, ResponseKind};
pub use result::{CacheOrigin, HealthStatus, RequestResult};
pub use transport::{HyperTransport, Transport, TransportResponse};
