//! Packet statistics for the capture hook.
//!
//! Counters are plain relaxed atomics: the packet path only ever adds, and
//! readers take a point-in-time snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cumulative capture statistics.
///
/// Every packet is counted in `total_packets` and `total_bytes` once, then
/// in exactly one of `passed_packets` or `dropped_packets`. Bypassed
/// control traffic counts as passed and additionally in `bypassed_packets`.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub total_packets: Counter,
    pub total_bytes: Counter,
    pub passed_packets: Counter,
    pub dropped_packets: Counter,
    pub bypassed_packets: Counter,
    /// Passed packets the delegate handler failed to accept.
    pub forward_errors: Counter,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a packet entering the hook.
    pub fn record_received(&self, bytes: usize) {
        self.total_packets.inc();
        self.total_bytes.add(bytes as u64);
    }

    pub fn record_passed(&self) {
        self.passed_packets.inc();
    }

    /// Records a control packet that skipped the chain.
    pub fn record_bypassed(&self) {
        self.passed_packets.inc();
        self.bypassed_packets.inc();
    }

    pub fn record_dropped(&self) {
        self.dropped_packets.inc();
    }

    pub fn record_forward_error(&self) {
        self.forward_errors.inc();
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            total_packets: self.total_packets.get(),
            total_bytes: self.total_bytes.get(),
            passed_packets: self.passed_packets.get(),
            dropped_packets: self.dropped_packets.get(),
            bypassed_packets: self.bypassed_packets.get(),
            forward_errors: self.forward_errors.get(),
        }
    }
}

/// Plain copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub passed_packets: u64,
    pub dropped_packets: u64,
    pub bypassed_packets: u64,
    pub forward_errors: u64,
}
