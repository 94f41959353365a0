// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Injectable wall-clock abstraction for time-sensitive policy code.
//!
//! TTL expiry, stale-while-revalidate windows, and circuit-breaker reset
//! timeouts are all defined in terms of "time since some recorded moment".
//! Testing that kind of logic against the real clock is slow and flaky, so
//! everything in this workspace reads time through a [`Clock`] handle that is
//! injected at construction.
//!
//! In production, [`Clock::new`] reads the system clock. In tests, enable the
//! `test-util` feature and build a clock from a [`ClockControl`], which lets
//! the test advance time explicitly:
//!
//! ```
//! # #[cfg(feature = "test-util")]
//! # {
//! use std::time::Duration;
//!
//! use palisade_clock::ClockControl;
//!
//! let control = ClockControl::new();
//! let clock = control.to_clock();
//!
//! let before = clock.now_millis();
//! control.advance(Duration::from_secs(5));
//! assert_eq!(clock.now_millis() - before, 5000);
//! # }
//! ```
//!
//! Cloning a clock is inexpensive and clones created from the same
//! [`ClockControl`] share the same controlled time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;

/// A cheap-to-clone source of wall-clock time, measured in milliseconds
/// since the Unix epoch.
#[derive(Clone, Debug, Default)]
pub struct Clock(Source);

#[derive(Clone, Debug, Default)]
enum Source {
    #[default]
    System,

    #[cfg(any(test, feature = "test-util"))]
    Manual(Arc<Mutex<u64>>),
}

impl Clock {
    /// Creates a clock backed by the system time.
    #[must_use]
    pub fn new() -> Self {
        Self(Source::System)
    }

    /// Returns the current time in milliseconds since the Unix epoch.
    ///
    /// System time is not monotonic; callers that compare two readings use
    /// saturating arithmetic to tolerate the clock moving backwards.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        match &self.0 {
            Source::System => {
                let since_epoch = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::ZERO);
                u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
            }

            #[cfg(any(test, feature = "test-util"))]
            Source::Manual(now) => *now.lock(),
        }
    }
}

/// Controls the flow of time in tests.
///
/// Clocks created via [`ClockControl::to_clock`] read a manually controlled
/// time that starts at the Unix epoch and only moves when the control is told
/// to move it. Never enable the `test-util` feature outside of
/// `dev-dependencies`.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Debug, Default)]
pub struct ClockControl {
    now: Arc<Mutex<u64>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ClockControl {
    /// Creates a control whose time starts at the Unix epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock that reads this control's time. All clocks created
    /// from the same control observe the same time.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock(Source::Manual(Arc::clone(&self.now)))
    }

    /// Moves time forward by the given amount.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
    }

    /// Sets the absolute time in milliseconds since the Unix epoch.
    pub fn set(&self, millis: u64) {
        *self.now.lock() = millis;
    }
}
