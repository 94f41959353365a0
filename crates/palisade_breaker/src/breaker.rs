// Copyright (c) Microsoft Corporation.

use std::time::Duration;

use palisade_clock::Clock;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// The three circuit states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; requests flow through.
    Closed,
    /// Requests are blocked; the service is failing.
    Open,
    /// Testing recovery; a limited number of probes are allowed.
    HalfOpen,
}

/// Tuning knobs for a [`CircuitBreaker`].
#[derive(Clone, Debug)]
pub struct BreakerOptions {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing for recovery.
    pub reset_timeout: Duration,
    /// Probes allowed through while half-open.
    pub half_open_max_requests: u32,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

/// Point-in-time snapshot of a breaker, for health reporting.
#[derive(Clone, Debug)]
pub struct BreakerStatus {
    /// Current state after any lazy open-to-half-open transition.
    pub state: CircuitState,
    /// Consecutive failures recorded since the last success.
    pub failures: u32,
    /// Total successes recorded over the breaker's lifetime.
    pub successes: u64,
    /// When the last failure was recorded, in milliseconds since the epoch.
    pub last_failure_ms: Option<u64>,
    /// Whether a request would currently be allowed through.
    pub can_request: bool,
    /// Elapsed time since the last failure.
    pub time_since_last_failure: Option<Duration>,
    /// Remaining cooldown before the next recovery probe; zero unless open.
    pub time_until_retry: Duration,
}

/// Failure-isolation state machine for a single service.
///
/// All methods take `&self`; state lives behind a mutex and every mutation
/// is confined to a single operation, so the breaker can be shared freely.
#[derive(Debug)]
pub struct CircuitBreaker {
    service_id: String,
    options: BreakerOptions,
    inner: Mutex<Inner>,
    clock: Clock,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u64,
    last_failure_ms: Option<u64>,
    half_open_requests: u32,
}

impl CircuitBreaker {
    /// Creates a closed breaker for `service_id`.
    #[must_use]
    pub fn new(service_id: impl Into<String>, options: BreakerOptions, clock: Clock) -> Self {
        Self {
            service_id: service_id.into(),
            options,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure_ms: None,
                half_open_requests: 0,
            }),
            clock,
        }
    }

    /// The service this breaker guards.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Whether a request may proceed right now.
    ///
    /// In the open state this lazily transitions to half-open once the reset
    /// timeout has elapsed since the last failure; in the half-open state it
    /// admits requests only while the probe budget lasts.
    pub fn can_request(&self) -> bool {
        let now = self.clock.now_millis();
        self.inner.lock().can_request(now, &self.options, &self.service_id)
    }

    /// Counts an admitted request against the half-open probe budget.
    /// No-op in other states.
    pub fn track_half_open_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_requests += 1;
        }
    }

    /// Records a successful request. Closes the circuit if half-open and
    /// always clears the failure and probe counters.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.successes += 1;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            debug!(service = %self.service_id, "circuit half-open -> closed (recovered)");
        }

        inner.failures = 0;
        inner.half_open_requests = 0;
    }

    /// Records a failed request. Reopens a half-open circuit immediately;
    /// opens a closed circuit once the failure threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure_ms = Some(self.clock.now_millis());

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            warn!(service = %self.service_id, "circuit half-open -> open (recovery failed)");
        } else if inner.state == CircuitState::Closed && inner.failures >= self.options.failure_threshold {
            inner.state = CircuitState::Open;
            warn!(
                service = %self.service_id,
                failures = inner.failures,
                "circuit closed -> open"
            );
        }
    }

    /// Forces the breaker back to closed with all counters zeroed, for
    /// operator recovery.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.last_failure_ms = None;
        inner.half_open_requests = 0;
        debug!(service = %self.service_id, "circuit reset to closed");
    }

    /// Returns a snapshot of the breaker.
    ///
    /// Like [`can_request`][Self::can_request], taking a snapshot performs
    /// the lazy open-to-half-open transition when the cooldown has elapsed.
    pub fn status(&self) -> BreakerStatus {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        let can_request = inner.can_request(now, &self.options, &self.service_id);

        let time_since_last_failure = inner
            .last_failure_ms
            .map(|at| Duration::from_millis(now.saturating_sub(at)));

        let time_until_retry = if inner.state == CircuitState::Open {
            let elapsed = inner.last_failure_ms.map_or(0, |at| now.saturating_sub(at));
            let reset = u64::try_from(self.options.reset_timeout.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(reset.saturating_sub(elapsed))
        } else {
            Duration::ZERO
        };

        BreakerStatus {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            last_failure_ms: inner.last_failure_ms,
            can_request,
            time_since_last_failure,
            time_until_retry,
        }
    }

    /// Current state without any lazy transition; used for aggregate counts.
    pub(crate) fn raw_state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

impl Inner {
    fn can_request(&mut self, now: u64, options: &BreakerOptions, service_id: &str) -> bool {
        match self.state {
            CircuitState::Closed => true,

            CircuitState::Open => {
                let elapsed = self.last_failure_ms.map_or(u64::MAX, |at| now.saturating_sub(at));
                if elapsed >= u64::try_from(options.reset_timeout.as_millis()).unwrap_or(u64::MAX) {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_requests = 0;
                    debug!(service = %service_id, "circuit open -> half-open (testing recovery)");
                    true
                } else {
                    false
                }
            }

            CircuitState::HalfOpen => self.half_open_requests < options.half_open_max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use palisade_clock::ClockControl;

    use super::*;

    fn breaker(control: &ClockControl) -> CircuitBreaker {
        CircuitBreaker::new(
            "svc",
            BreakerOptions {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(30),
                half_open_max_requests: 1,
            },
            control.to_clock(),
        )
    }

    fn open_breaker(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.raw_state(), CircuitState::Open);
    }

    #[test]
    fn closed_breaker_admits_requests() {
        let control = ClockControl::new();
        let breaker = breaker(&control);

        assert!(breaker.can_request());
    }

    #[test]
    fn failures_below_threshold_keep_the_circuit_closed() {
        let control = ClockControl::new();
        let breaker = breaker(&control);

        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.raw_state(), CircuitState::Closed);
        assert!(breaker.can_request());
    }

    #[test]
    fn threshold_failures_open_the_circuit_and_block_requests() {
        let control = ClockControl::new();
        let breaker = breaker(&control);

        open_breaker(&breaker);
        assert!(!breaker.can_request());
    }

    #[test]
    fn open_circuit_transitions_to_half_open_after_reset_timeout() {
        let control = ClockControl::new();
        let breaker = breaker(&control);
        open_breaker(&breaker);

        control.advance(Duration::from_secs(29));
        assert!(!breaker.can_request());

        control.advance(Duration::from_secs(1));
        assert!(breaker.can_request());
        assert_eq!(breaker.raw_state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_only_the_probe_budget() {
        let control = ClockControl::new();
        let breaker = breaker(&control);
        open_breaker(&breaker);

        control.advance(Duration::from_secs(30));
        assert!(breaker.can_request());

        breaker.track_half_open_probe();
        assert!(!breaker.can_request());
    }

    #[test]
    fn success_while_half_open_closes_the_circuit() {
        let control = ClockControl::new();
        let breaker = breaker(&control);
        open_breaker(&breaker);

        control.advance(Duration::from_secs(30));
        assert!(breaker.can_request());
        breaker.track_half_open_probe();

        breaker.record_success();

        assert_eq!(breaker.raw_state(), CircuitState::Closed);
        assert!(breaker.can_request());
        assert_eq!(breaker.status().failures, 0);
    }

    #[test]
    fn failure_while_half_open_reopens_and_restarts_the_cooldown() {
        let control = ClockControl::new();
        let breaker = breaker(&control);
        open_breaker(&breaker);

        control.advance(Duration::from_secs(30));
        assert!(breaker.can_request());
        breaker.track_half_open_probe();

        breaker.record_failure();
        assert_eq!(breaker.raw_state(), CircuitState::Open);

        // the cooldown clock restarted at the half-open failure
        control.advance(Duration::from_secs(29));
        assert!(!breaker.can_request());
        control.advance(Duration::from_secs(1));
        assert!(breaker.can_request());
    }

    #[test]
    fn success_always_clears_the_failure_count() {
        let control = ClockControl::new();
        let breaker = breaker(&control);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        // two consecutive failures after the reset: still closed
        assert_eq!(breaker.raw_state(), CircuitState::Closed);
    }

    #[test]
    fn reset_forces_closed_with_all_counters_zeroed() {
        let control = ClockControl::new();
        let breaker = breaker(&control);
        open_breaker(&breaker);

        breaker.reset();

        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failures, 0);
        assert_eq!(status.successes, 0);
        assert_eq!(status.last_failure_ms, None);
        assert!(status.can_request);
    }

    #[test]
    fn status_reports_cooldown_remaining_while_open() {
        let control = ClockControl::new();
        control.set(1000);
        let breaker = breaker(&control);
        open_breaker(&breaker);

        control.advance(Duration::from_secs(10));
        let status = breaker.status();

        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.time_until_retry, Duration::from_secs(20));
        assert_eq!(status.time_since_last_failure, Some(Duration::from_secs(10)));
        assert!(!status.can_request);
    }
}
