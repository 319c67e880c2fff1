// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! All cooldown, lease, and TTL math in Pilot is epoch-millisecond
//! arithmetic; persisted timestamps render as ISO-8601 UTC.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_ms(&self) -> u64;

    /// Current time as a UTC datetime (derived from `epoch_ms`).
    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.epoch_ms() as i64)
            .single()
            .unwrap_or_default()
    }

    /// Current time rendered as ISO-8601 UTC (e.g. `2026-02-01T09:30:00.000Z`).
    fn now_iso(&self) -> String {
        self.now_utc().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    /// Current date rendered `YYYY-MM-DD`, for daily cost buckets.
    fn today(&self) -> String {
        self.now_utc().format("%Y-%m-%d").to_string()
    }
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            epoch_ms: Arc::new(Mutex::new(1_700_000_000_000)),
        }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance_ms(&self, ms: u64) {
        *self.epoch_ms.lock() += ms;
    }

    /// Advance the clock by the given number of seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }

    /// Set the epoch milliseconds value
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

/// Parse an ISO-8601 UTC timestamp back to epoch milliseconds.
///
/// Returns `None` for unparseable input rather than erroring; corrupt
/// timestamps in state files degrade to "very old".
pub fn parse_iso_ms(ts: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp_millis().max(0) as u64)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
