use std::time::Duration;

/// Region cache configuration.
///
/// Supplied by the host as part of its typed option tree; the cache itself
/// performs no configuration loading.
#[derive(Debug, Clone)]
pub struct RegionCacheConfig {
    /// Hard LRU capacity in slots
    pub max_entries: usize,
    /// Whether memory-driven eviction runs at all
    pub enable_depressurize: bool,
    /// Free percentage below which depressurization triggers
    pub min_free_percentage: u64,
    /// Free percentage depressurization drives toward
    pub target_free_percentage: u64,
    /// Minimum spacing between depressurization steps
    pub iteration_interval: Duration,
}

impl Default for RegionCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            enable_depressurize: true,
            min_free_percentage: 20,
            target_free_percentage: 40,
            iteration_interval: Duration::from_millis(100),
        }
    }
}

impl RegionCacheConfig {
    /// Set the LRU slot capacity.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Enable or disable memory-driven eviction.
    pub fn with_depressurize(mut self, enabled: bool) -> Self {
        self.enable_depressurize = enabled;
        self
    }

    /// Set the free-percentage trigger threshold.
    pub fn with_min_free_percentage(mut self, pct: u64) -> Self {
        self.min_free_percentage = pct;
        self
    }

    /// Set the free-percentage target.
    pub fn with_target_free_percentage(mut self, pct: u64) -> Self {
        self.target_free_percentage = pct;
        self
    }

    /// Set the spacing between depressurization steps.
    pub fn with_iteration_interval(mut self, interval: Duration) -> Self {
        self.iteration_interval = interval;
        self
    }
}
