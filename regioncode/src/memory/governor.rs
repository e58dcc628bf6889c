//! Free-memory probing and the depressurization primitive.
//!
//! Rust has no managed heap reporting free/max, so "free" is computed as
//! `limit - RSS`: resident set size from `/proc/self/statm` against a
//! configured budget defaulting to detected total system memory. The
//! percentage is only meaningful when this process is the dominant
//! consumer of its budget (the analogue of a preallocated heap); hosts
//! sharing a box must configure an explicit `limit_bytes`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cache::RegionCacheError;

/// A cache that can shed its smallest entry on demand.
///
/// Implemented by the region caches; the governor stays ignorant of entry
/// types and only sees the rendered key and the subclass size metric.
pub trait Depressurizable: Send + Sync {
    /// Evicts the entry with the smallest size metric.
    ///
    /// Returns the evicted entry's rendered key and size, or `None` when
    /// nothing is evictable.
    fn evict_smallest(&self) -> Option<(String, usize)>;
}

/// Free-memory figures at one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Free bytes expressed in whole megabytes
    pub free_mb: u64,
    /// `free * 100 / limit`
    pub free_pct: u64,
}

/// Governor configuration.
#[derive(Debug, Clone)]
pub struct MemoryGovernorConfig {
    /// Memory budget the process is allowed to fill (default: detected
    /// total system memory)
    pub limit_bytes: usize,
    /// Free percentage depressurization drives toward
    pub target_free_percentage: u64,
    /// Minimum wall-clock spacing between eviction steps
    pub iteration_interval: Duration,
}

impl Default for MemoryGovernorConfig {
    fn default() -> Self {
        Self {
            limit_bytes: detect_total_memory(),
            target_free_percentage: 40,
            iteration_interval: Duration::from_millis(100),
        }
    }
}

impl MemoryGovernorConfig {
    /// Set the memory budget in bytes.
    pub fn with_limit_bytes(mut self, limit: usize) -> Self {
        self.limit_bytes = limit;
        self
    }

    /// Set the free-percentage target for depressurization.
    pub fn with_target_free_percentage(mut self, pct: u64) -> Self {
        self.target_free_percentage = pct;
        self
    }

    /// Set the minimum spacing between eviction steps.
    pub fn with_iteration_interval(mut self, interval: Duration) -> Self {
        self.iteration_interval = interval;
        self
    }
}

/// Process-wide free-heap probe and depressurization driver.
pub struct MemoryGovernor {
    config: MemoryGovernorConfig,
    used_probe: Box<dyn Fn() -> usize + Send + Sync>,
    last_step: Mutex<Option<Instant>>,
}

impl MemoryGovernor {
    /// Creates a governor probing the process RSS.
    pub fn new(config: MemoryGovernorConfig) -> Self {
        Self::with_probe(config, rss_bytes)
    }

    /// Creates a governor with an injected used-bytes probe (tests).
    pub fn with_probe(
        config: MemoryGovernorConfig,
        used_probe: impl Fn() -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            used_probe: Box::new(used_probe),
            last_step: Mutex::new(None),
        }
    }

    /// Current free-memory figures.
    pub fn free_stats(&self) -> MemoryStats {
        let limit = self.config.limit_bytes.max(1);
        let used = (self.used_probe)();
        let free = limit.saturating_sub(used);
        MemoryStats {
            free_mb: (free / (1024 * 1024)) as u64,
            free_pct: (free as u64).saturating_mul(100) / limit as u64,
        }
    }

    /// True when at least `min_pct` percent of the budget is free.
    pub fn at_least_free(&self, min_pct: u64) -> bool {
        self.free_stats().free_pct >= min_pct
    }

    /// Fails with `OutOfMemoryPressure` when free memory is below
    /// `min_pct`, optionally requesting an allocator compaction cycle and
    /// re-probing first.
    pub fn ensure_free(&self, min_pct: u64, run_compaction: bool) -> Result<(), RegionCacheError> {
        if self.at_least_free(min_pct) {
            return Ok(());
        }
        if run_compaction {
            request_compaction();
            if self.at_least_free(min_pct) {
                return Ok(());
            }
        }
        let stats = self.free_stats();
        warn!(
            free_pct = stats.free_pct,
            min_pct, "free memory below threshold"
        );
        Err(RegionCacheError::OutOfMemoryPressure {
            free_pct: stats.free_pct,
            min_pct,
        })
    }

    /// Evicts the cache's smallest entries until the free target is met.
    ///
    /// Eviction steps are spaced at least `iteration_interval` apart
    /// across all callers, which bounds churn when the hook fires from
    /// both the background loop and inline decode pacing. A call made
    /// inside the spacing window returns without evicting.
    pub fn depressurize(&self, cache: &dyn Depressurizable) {
        while !self.at_least_free(self.config.target_free_percentage) {
            {
                let mut last_step = self.last_step.lock().expect("governor lock poisoned");
                if let Some(at) = *last_step {
                    if at.elapsed() < self.config.iteration_interval {
                        return;
                    }
                }
                *last_step = Some(Instant::now());
            }

            match cache.evict_smallest() {
                Some((key, size)) => {
                    let stats = self.free_stats();
                    info!(
                        key = %key,
                        size,
                        free_pct = stats.free_pct,
                        target_pct = self.config.target_free_percentage,
                        "depressurized cache entry"
                    );
                }
                None => {
                    debug!("cache empty, depressurization stops short of target");
                    return;
                }
            }
        }
    }
}

/// Resident set size of this process in bytes.
///
/// # Platform Support
///
/// - **Linux**: parses `/proc/self/statm`
/// - **Other platforms**: returns 0, which disables pressure reporting
#[cfg(target_os = "linux")]
fn rss_bytes() -> usize {
    use std::fs;

    // Format: "size resident shared text lib data dt" in pages
    if let Ok(content) = fs::read_to_string("/proc/self/statm") {
        if let Some(resident) = content.split_whitespace().nth(1) {
            if let Ok(pages) = resident.parse::<usize>() {
                let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
                if page_size > 0 {
                    return pages * page_size as usize;
                }
            }
        }
    }
    0
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> usize {
    0
}

/// Detect total system memory in bytes.
///
/// # Platform Support
///
/// - **Linux**: parses `/proc/meminfo`
/// - **Other platforms**: returns fallback of 8GB
#[cfg(target_os = "linux")]
fn detect_total_memory() -> usize {
    use std::fs;

    if let Ok(content) = fs::read_to_string("/proc/meminfo") {
        for line in content.lines() {
            if line.starts_with("MemTotal:") {
                // Format: "MemTotal:       16384000 kB"
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 {
                    if let Ok(kb) = parts[1].parse::<usize>() {
                        return kb * 1024;
                    }
                }
            }
        }
    }

    fallback_memory()
}

#[cfg(not(target_os = "linux"))]
fn detect_total_memory() -> usize {
    fallback_memory()
}

/// Fallback memory budget when detection fails.
const fn fallback_memory() -> usize {
    8 * 1024 * 1024 * 1024 // 8GB
}

/// Ask the allocator to return freed pages to the OS.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn request_compaction() {
    debug!("requesting malloc_trim compaction cycle");
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn request_compaction() {
    debug!("no allocator compaction available on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MB: usize = 1024 * 1024;

    fn governor_with_used(
        limit: usize,
        used: Arc<AtomicUsize>,
        interval: Duration,
    ) -> MemoryGovernor {
        let config = MemoryGovernorConfig::default()
            .with_limit_bytes(limit)
            .with_target_free_percentage(40)
            .with_iteration_interval(interval);
        MemoryGovernor::with_probe(config, move || used.load(Ordering::Relaxed))
    }

    /// Eviction victim list standing in for a cache.
    struct FakeCache {
        sizes: Mutex<Vec<usize>>,
        used: Arc<AtomicUsize>,
        reclaim_per_eviction: usize,
    }

    impl Depressurizable for FakeCache {
        fn evict_smallest(&self) -> Option<(String, usize)> {
            let mut sizes = self.sizes.lock().unwrap();
            if sizes.is_empty() {
                return None;
            }
            let (pos, _) = sizes
                .iter()
                .enumerate()
                .min_by_key(|(_, size)| **size)
                .unwrap();
            let size = sizes.remove(pos);
            self.used
                .fetch_sub(self.reclaim_per_eviction, Ordering::Relaxed);
            Some((format!("entry-{}", size), size))
        }
    }

    #[test]
    fn test_free_stats_arithmetic() {
        let used = Arc::new(AtomicUsize::new(75 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        let stats = governor.free_stats();
        assert_eq!(stats.free_mb, 25);
        assert_eq!(stats.free_pct, 25);
    }

    #[test]
    fn test_free_stats_saturate_when_over_budget() {
        let used = Arc::new(AtomicUsize::new(150 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        let stats = governor.free_stats();
        assert_eq!(stats.free_mb, 0);
        assert_eq!(stats.free_pct, 0);
    }

    #[test]
    fn test_at_least_free() {
        let used = Arc::new(AtomicUsize::new(50 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        assert!(governor.at_least_free(40));
        assert!(governor.at_least_free(50));
        assert!(!governor.at_least_free(51));
    }

    #[test]
    fn test_ensure_free_passes_above_threshold() {
        let used = Arc::new(AtomicUsize::new(10 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);
        assert!(governor.ensure_free(50, false).is_ok());
    }

    #[test]
    fn test_ensure_free_fails_with_payload() {
        let used = Arc::new(AtomicUsize::new(93 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        let err = governor.ensure_free(20, false).unwrap_err();
        assert_eq!(
            err,
            RegionCacheError::OutOfMemoryPressure {
                free_pct: 7,
                min_pct: 20
            }
        );
    }

    #[test]
    fn test_ensure_free_with_compaction_still_fails_when_pressured() {
        let used = Arc::new(AtomicUsize::new(95 * MB));
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);
        assert!(governor.ensure_free(50, true).is_err());
    }

    #[test]
    fn test_depressurize_evicts_smallest_until_target() {
        let used = Arc::new(AtomicUsize::new(90 * MB));
        let cache = FakeCache {
            sizes: Mutex::new(vec![51, 9, 8]),
            used: used.clone(),
            // Each eviction frees 20MB; two evictions reach the 40% target
            reclaim_per_eviction: 20 * MB,
        };
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        governor.depressurize(&cache);

        // Smallest entries went first; the 51-coordinate ward index survives
        let remaining = cache.sizes.lock().unwrap().clone();
        assert_eq!(remaining, vec![51]);
        assert!(governor.at_least_free(40));
    }

    #[test]
    fn test_depressurize_stops_on_empty_cache() {
        let used = Arc::new(AtomicUsize::new(99 * MB));
        let cache = FakeCache {
            sizes: Mutex::new(Vec::new()),
            used: used.clone(),
            reclaim_per_eviction: 0,
        };
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        // Must terminate even though the target is unreachable
        governor.depressurize(&cache);
        assert!(!governor.at_least_free(40));
    }

    #[test]
    fn test_depressurize_noop_when_already_free() {
        let used = Arc::new(AtomicUsize::new(10 * MB));
        let cache = FakeCache {
            sizes: Mutex::new(vec![5, 6]),
            used: used.clone(),
            reclaim_per_eviction: MB,
        };
        let governor = governor_with_used(100 * MB, used, Duration::ZERO);

        governor.depressurize(&cache);
        assert_eq!(cache.sizes.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_depressurize_steps_are_rate_limited() {
        let used = Arc::new(AtomicUsize::new(99 * MB));
        let cache = FakeCache {
            sizes: Mutex::new(vec![1, 2, 3]),
            used: used.clone(),
            reclaim_per_eviction: MB,
        };
        // Interval far longer than the test; only the first step may run
        let governor = governor_with_used(100 * MB, used, Duration::from_secs(60));

        governor.depressurize(&cache);
        governor.depressurize(&cache);

        assert_eq!(cache.sizes.lock().unwrap().len(), 2);
    }
}
