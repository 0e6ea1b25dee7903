//! Call statistics for the remote log API, split between target discovery
//! (`listGroups`, `listStreams`) and event fetching, since the two have very
//! different latency profiles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Listing,
    Fetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOutcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Default)]
struct CallCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    latency_ns: AtomicU64,
}

impl CallCounters {
    fn record(&self, outcome: CallOutcome, latency: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        match outcome {
            CallOutcome::Success => {}
            CallOutcome::Failure => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            CallOutcome::Timeout => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> CallStats {
        let calls = self.calls.load(Ordering::Relaxed);
        let latency_ns = self.latency_ns.load(Ordering::Relaxed);
        CallStats {
            calls,
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            average_latency_ms: if calls == 0 {
                0.0
            } else {
                latency_ns as f64 / calls as f64 / 1_000_000.0
            },
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SourceMetrics {
    listing: CallCounters,
    fetch: CallCounters,
}

impl SourceMetrics {
    pub(crate) fn record(&self, kind: CallKind, outcome: CallOutcome, latency: Duration) {
        match kind {
            CallKind::Listing => self.listing.record(outcome, latency),
            CallKind::Fetch => self.fetch.record(outcome, latency),
        }
    }

    pub(crate) fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            listing: self.listing.snapshot(),
            fetch: self.fetch.snapshot(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CallStats {
    pub calls: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub average_latency_ms: f64,
}

impl CallStats {
    pub fn error_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SourceMetricsSnapshot {
    pub listing: CallStats,
    pub fetch: CallStats,
}

impl SourceMetricsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.listing.calls + self.fetch.calls
    }

    pub fn total_errors(&self) -> u64 {
        self.listing.errors + self.fetch.errors
    }

    pub fn total_timeouts(&self) -> u64 {
        self.listing.timeouts + self.fetch.timeouts
    }
}
