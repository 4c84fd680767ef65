//! Store backend metrics

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Store operation metrics
#[derive(Debug)]
pub struct StoreMetrics {
    // Read metrics (get, range, count)
    read_count: AtomicU64,
    read_latency_us: AtomicU64,
    read_errors: AtomicU64,

    // Transaction metrics
    txn_count: AtomicU64,
    txn_latency_us: AtomicU64,
    txn_errors: AtomicU64,

    // Failed transaction preconditions
    conflict_count: AtomicU64,

    // Watch metrics
    watch_started: AtomicU64,
    watch_interrupted: AtomicU64,

    // Key space metrics
    total_keys: AtomicU64,
    total_bytes: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self {
            read_count: AtomicU64::new(0),
            read_latency_us: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            txn_count: AtomicU64::new(0),
            txn_latency_us: AtomicU64::new(0),
            txn_errors: AtomicU64::new(0),
            conflict_count: AtomicU64::new(0),
            watch_started: AtomicU64::new(0),
            watch_interrupted: AtomicU64::new(0),
            total_keys: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    /// Record a read operation
    pub fn record_read(&self, duration: Duration, error: bool) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.read_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a transaction; `error` covers failed preconditions too
    pub fn record_txn(&self, duration: Duration, error: bool) {
        self.txn_count.fetch_add(1, Ordering::Relaxed);
        self.txn_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.txn_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed transaction precondition
    pub fn record_conflict(&self) {
        self.conflict_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_started(&self) {
        self.watch_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_interrupted(&self) {
        self.watch_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Update key space metrics
    pub fn update_key_space(&self, keys: u64, bytes: u64) {
        self.total_keys.store(keys, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let read_count = self.read_count.load(Ordering::Relaxed);
        let txn_count = self.txn_count.load(Ordering::Relaxed);

        let read_latency_us = self.read_latency_us.load(Ordering::Relaxed);
        let txn_latency_us = self.txn_latency_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            read_count,
            read_avg_latency_us: if read_count > 0 { read_latency_us / read_count } else { 0 },
            read_errors: self.read_errors.load(Ordering::Relaxed),
            txn_count,
            txn_avg_latency_us: if txn_count > 0 { txn_latency_us / txn_count } else { 0 },
            txn_errors: self.txn_errors.load(Ordering::Relaxed),
            conflict_count: self.conflict_count.load(Ordering::Relaxed),
            watch_started: self.watch_started.load(Ordering::Relaxed),
            watch_interrupted: self.watch_interrupted.load(Ordering::Relaxed),
            total_keys: self.total_keys.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters; key space gauges are kept
    pub fn reset(&self) {
        self.read_count.store(0, Ordering::Relaxed);
        self.read_latency_us.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.txn_count.store(0, Ordering::Relaxed);
        self.txn_latency_us.store(0, Ordering::Relaxed);
        self.txn_errors.store(0, Ordering::Relaxed);
        self.conflict_count.store(0, Ordering::Relaxed);
        self.watch_started.store(0, Ordering::Relaxed);
        self.watch_interrupted.store(0, Ordering::Relaxed);
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub read_count: u64,
    pub read_avg_latency_us: u64,
    pub read_errors: u64,
    pub txn_count: u64,
    pub txn_avg_latency_us: u64,
    pub txn_errors: u64,
    pub conflict_count: u64,
    pub watch_started: u64,
    pub watch_interrupted: u64,
    pub total_keys: u64,
    pub total_bytes: u64,
}

/// Helper to measure operation duration
pub struct OpTimer {
    start: Instant,
}

impl OpTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for OpTimer {
    fn default() -> Self {
        Self::new()
    }
}
