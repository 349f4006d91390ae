// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall time in microseconds since the epoch; actors stamp creation and
/// deletion with it.
pub trait Clock: Send + Sync {
    fn now_usecs(&self) -> u64;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_usecs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// Fake clock for testing with controllable time.
pub struct FakeClock {
    usecs: Mutex<u64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { usecs: Mutex::new(1_000_000) }
    }

    /// Advance the clock by the given number of microseconds.
    pub fn advance(&self, usecs: u64) {
        *self.usecs.lock() += usecs;
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, usecs: u64) {
        *self.usecs.lock() = usecs;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_usecs(&self) -> u64 {
        *self.usecs.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
