//! Lock-free cache metrics.
//!
//! Counters and gauges use atomics with `Relaxed` ordering; the values are
//! independent measurements and need no ordering between each other. Each
//! cache registers its metrics under a stable name in a process-wide
//! registry; registration is idempotent so test suites can recreate caches
//! without tripping duplicate-registration errors.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;

static REGISTRY: Lazy<DashMap<String, Arc<CacheMetrics>>> = Lazy::new(DashMap::new);

/// Gauge and timers for one region cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Currently cached entry count
    entries: AtomicUsize,
    /// Remote fetches completed
    fetch_count: AtomicU64,
    /// Total remote fetch time in microseconds
    fetch_time_us: AtomicU64,
    /// Index builds completed
    build_count: AtomicU64,
    /// Total index build time in microseconds
    build_time_us: AtomicU64,
}

/// Point-in-time copy of the metric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub entries: usize,
    pub fetch_count: u64,
    pub fetch_time_us: u64,
    pub build_count: u64,
    pub build_time_us: u64,
}

impl CacheMetrics {
    /// Looks up or creates the metrics registered under `name`.
    ///
    /// Re-registering an existing name returns the same instance.
    pub fn register(name: &str) -> Arc<CacheMetrics> {
        REGISTRY
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CacheMetrics::default()))
            .clone()
    }

    /// Updates the entry-count gauge.
    pub fn set_entries(&self, count: usize) {
        self.entries.store(count, Ordering::Relaxed);
    }

    /// Records one completed remote fetch.
    pub fn record_fetch(&self, elapsed: Duration) {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        self.fetch_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Records one completed index build.
    pub fn record_build(&self, elapsed: Duration) {
        self.build_count.fetch_add(1, Ordering::Relaxed);
        self.build_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Reads all values at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries: self.entries.load(Ordering::Relaxed),
            fetch_count: self.fetch_count.load(Ordering::Relaxed),
            fetch_time_us: self.fetch_time_us.load(Ordering::Relaxed),
            build_count: self.build_count.load(Ordering::Relaxed),
            build_time_us: self.build_time_us.load(Ordering::Relaxed),
        }
    }
}
