// Copyright (c) Microsoft Corporation.

use std::collections::HashMap;
use std::sync::Arc;

use palisade_clock::Clock;
use parking_lot::Mutex;

use crate::breaker::{BreakerOptions, BreakerStatus, CircuitBreaker, CircuitState};

/// Lazily instantiates and memoizes one [`CircuitBreaker`] per service.
///
/// The first `get_or_create` for a service wins: options passed on later
/// calls for the same service are ignored for the process lifetime.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    clock: Clock,
}

impl BreakerRegistry {
    /// Creates an empty registry whose breakers read time from `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the breaker for `service_id`, creating it with `options` on
    /// first use.
    pub fn get_or_create(&self, service_id: &str, options: BreakerOptions) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get(service_id) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::new(service_id, options, self.clock.clone()));
        breakers.insert(service_id.to_owned(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshot of every known breaker, keyed by service identifier.
    pub fn status_map(&self) -> HashMap<String, BreakerStatus> {
        self.breakers
            .lock()
            .iter()
            .map(|(id, breaker)| (id.clone(), breaker.status()))
            .collect()
    }

    /// Number of circuits currently open.
    pub fn open_count(&self) -> usize {
        self.breakers
            .lock()
            .values()
            .filter(|breaker| breaker.raw_state() == CircuitState::Open)
            .count()
    }

    /// Forces every breaker back to closed.
    pub fn reset_all(&self) {
        for breaker in self.breakers.lock().values() {
            breaker.reset();
        }
    }
}
