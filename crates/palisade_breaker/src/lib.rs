// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-service circuit breaker: stop calling a dependency that is failing
//! persistently, then probe for recovery after a cooldown.
//!
//! A [`CircuitBreaker`] is a small state machine:
//!
//! - `Closed` — requests flow; consecutive failures accumulate. Reaching the
//!   failure threshold opens the circuit.
//! - `Open` — requests are blocked outright. Once the reset timeout has
//!   elapsed since the last failure, the next [`can_request`][CircuitBreaker::can_request]
//!   call transitions to half-open.
//! - `HalfOpen` — a bounded number of probe requests are allowed through. A
//!   recorded success closes the circuit; a recorded failure reopens it.
//!
//! One breaker exists per service identifier, created lazily and held for
//! the process lifetime by a [`BreakerRegistry`]. Failure history is
//! deliberately not persisted across restarts.

mod breaker;
mod registry;

pub use breaker::{BreakerOptions, BreakerStatus, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;
