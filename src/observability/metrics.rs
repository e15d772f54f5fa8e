//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase, reset only on process start
//! - Thread-safe; batches update it from several threads

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    RemoteCommands,
    RemoteFailures,
    BenignFailures,
    Starts,
    Stops,
    Reloads,
    Rebuilds,
    RewindsSucceeded,
    RewindsFailed,
    FullResyncs,
    Promotions,
    Demotions,
    Remasters,
    Failovers,
    SafetyViolations,
}

const COUNTERS: usize = 15;

impl Counter {
    fn slot(self) -> usize {
        self as usize
    }
}

/// Metrics registry containing all operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: [AtomicU64; COUNTERS],
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment one counter
    pub fn increment(&self, counter: Counter) {
        self.counters[counter.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Read one counter
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            remote_commands: self.get(Counter::RemoteCommands),
            remote_failures: self.get(Counter::RemoteFailures),
            benign_failures: self.get(Counter::BenignFailures),
            starts: self.get(Counter::Starts),
            stops: self.get(Counter::Stops),
            reloads: self.get(Counter::Reloads),
            rebuilds: self.get(Counter::Rebuilds),
            rewinds_succeeded: self.get(Counter::RewindsSucceeded),
            rewinds_failed: self.get(Counter::RewindsFailed),
            full_resyncs: self.get(Counter::FullResyncs),
            promotions: self.get(Counter::Promotions),
            demotions: self.get(Counter::Demotions),
            remasters: self.get(Counter::Remasters),
            failovers: self.get(Counter::Failovers),
            safety_violations: self.get(Counter::SafetyViolations),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub remote_commands: u64,
    pub remote_failures: u64,
    pub benign_failures: u64,
    pub starts: u64,
    pub stops: u64,
    pub reloads: u64,
    pub rebuilds: u64,
    pub rewinds_succeeded: u64,
    pub rewinds_failed: u64,
    pub full_resyncs: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub remasters: u64,
    pub failovers: u64,
    pub safety_violations: u64,
}
