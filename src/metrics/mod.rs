//! Performance Metrics Module
//!
//! Counters describing how a [`ConcurrentMap`](crate::ConcurrentMap) spends its
//! time: how many reads and writes it served, how often a read had to wait for
//! earlier writes to drain, and how deep the write backlog grew.
//!
//! Collection uses relaxed atomics and can be switched off per map.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Point-in-time view of a map's counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapMetrics {
    /// Read tasks executed
    pub reads: u64,
    /// Write tasks submitted
    pub writes_submitted: u64,
    /// Write tasks applied to the store
    pub writes_applied: u64,
    /// Write tasks that panicked while being applied
    pub writes_failed: u64,
    /// Reads that had to wait for earlier writes before starting
    pub contended_reads: u64,
    /// Average time a read spent waiting for its turn, in nanoseconds
    pub avg_read_wait_ns: u64,
    /// Longest time a read spent waiting for its turn, in nanoseconds
    pub max_read_wait_ns: u64,
    /// Writes queued but not yet applied when the snapshot was taken
    pub pending_writes: usize,
    /// Largest write backlog observed
    pub peak_pending_writes: usize,
}

impl MapMetrics {
    /// Percentage of reads that waited on earlier writes
    pub fn contention_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            (self.contended_reads as f64 / self.reads as f64) * 100.0
        }
    }

    /// Percentage of applied writes that panicked
    pub fn failure_rate(&self) -> f64 {
        let finished = self.writes_applied + self.writes_failed;
        if finished == 0 {
            0.0
        } else {
            (self.writes_failed as f64 / finished as f64) * 100.0
        }
    }

    /// Average read wait as a `Duration`
    pub fn avg_read_wait(&self) -> Duration {
        Duration::from_nanos(self.avg_read_wait_ns)
    }

    /// Maximum read wait as a `Duration`
    pub fn max_read_wait(&self) -> Duration {
        Duration::from_nanos(self.max_read_wait_ns)
    }
}

/// Internal atomic metrics collection
#[derive(Debug)]
pub(crate) struct AtomicMetrics {
    enabled: AtomicBool,
    reads: AtomicU64,
    writes_submitted: AtomicU64,
    writes_applied: AtomicU64,
    writes_failed: AtomicU64,
    contended_reads: AtomicU64,
    total_wait_ns: AtomicU64,
    max_wait_ns: AtomicU64,
    pending_writes: AtomicUsize,
    peak_pending_writes: AtomicUsize,
}

impl AtomicMetrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            reads: AtomicU64::new(0),
            writes_submitted: AtomicU64::new(0),
            writes_applied: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            contended_reads: AtomicU64::new(0),
            total_wait_ns: AtomicU64::new(0),
            max_wait_ns: AtomicU64::new(0),
            pending_writes: AtomicUsize::new(0),
            peak_pending_writes: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record a read that was admitted after waiting `wait`
    pub(crate) fn record_read(&self, wait: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }
        self.reads.fetch_add(1, Ordering::Relaxed);

        let Some(wait) = wait else { return };
        let wait_ns = wait.as_nanos() as u64;
        self.contended_reads.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ns.fetch_add(wait_ns, Ordering::Relaxed);

        let mut current_max = self.max_wait_ns.load(Ordering::Relaxed);
        while wait_ns > current_max {
            match self.max_wait_ns.compare_exchange_weak(
                current_max,
                wait_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// Record a queued write and the backlog it produced
    pub(crate) fn record_submit(&self, backlog: usize) {
        if !self.is_enabled() {
            return;
        }
        self.writes_submitted.fetch_add(1, Ordering::Relaxed);
        self.pending_writes.store(backlog, Ordering::Relaxed);
        self.peak_pending_writes.fetch_max(backlog, Ordering::Relaxed);
    }

    /// Record a finished write and the backlog left behind it
    pub(crate) fn record_apply(&self, failed: bool, backlog: usize) {
        if !self.is_enabled() {
            return;
        }
        if failed {
            self.writes_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes_applied.fetch_add(1, Ordering::Relaxed);
        }
        self.pending_writes.store(backlog, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MapMetrics {
        let reads = self.reads.load(Ordering::Relaxed);
        let contended = self.contended_reads.load(Ordering::Relaxed);
        let total_wait = self.total_wait_ns.load(Ordering::Relaxed);

        MapMetrics {
            reads,
            writes_submitted: self.writes_submitted.load(Ordering::Relaxed),
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            contended_reads: contended,
            avg_read_wait_ns: if contended > 0 { total_wait / contended } else { 0 },
            max_read_wait_ns: self.max_wait_ns.load(Ordering::Relaxed),
            pending_writes: self.pending_writes.load(Ordering::Relaxed),
            peak_pending_writes: self.peak_pending_writes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub(crate) fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes_submitted.store(0, Ordering::Relaxed);
        self.writes_applied.store(0, Ordering::Relaxed);
        self.writes_failed.store(0, Ordering::Relaxed);
        self.contended_reads.store(0, Ordering::Relaxed);
        self.total_wait_ns.store(0, Ordering::Relaxed);
        self.max_wait_ns.store(0, Ordering::Relaxed);
        // The backlog reflects current state; only the high-water mark resets.
        self.peak_pending_writes
            .store(self.pending_writes.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

/// Trait for data structures that support performance metrics
pub trait MetricsCollector {
    /// Get current performance metrics
    fn metrics(&self) -> MapMetrics;

    /// Reset all metrics
    fn reset_metrics(&self);

    /// Enable or disable metrics collection
    fn set_metrics_enabled(&self, enabled: bool);

    /// Check if metrics collection is enabled
    fn is_metrics_enabled(&self) -> bool;
}
