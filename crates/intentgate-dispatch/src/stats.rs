//! In-memory dispatch counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::result::DispatchResult;

// ── dispatch stats ───────────────────────────────────────────────────

/// Counters over every [`Dispatcher::execute`](crate::Dispatcher::execute)
/// call since the dispatcher was created.
#[derive(Debug, Default)]
pub struct DispatchStats {
    total: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
    last_latency_us: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record(&self, result: &DispatchResult, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if result.is_success() {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.last_latency_us.store(micros, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn error(&self) -> u64 {
        self.error.load(Ordering::Relaxed)
    }

    /// Wall time of the most recent dispatch, in milliseconds.
    pub fn last_latency_ms(&self) -> f64 {
        self.last_latency_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_total: self.total(),
            requests_success: self.success(),
            requests_error: self.error(),
            last_request_latency_ms: self.last_latency_ms(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.success.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
        self.last_latency_us.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} success={} error={} last_latency={:.1}ms",
            self.total(),
            self.success(),
            self.error(),
            self.last_latency_ms(),
        )
    }
}

/// A point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_error: u64,
    pub last_request_latency_ms: f64,
}
