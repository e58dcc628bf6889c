//! Single-flight region cache core.
//!
//! The cache stores shared futures rather than finished indices: the slot
//! table maps a [`RegionCacheKey`] to the one population ever started for
//! it, and every concurrent caller clones the same future. Lookup and
//! install happen under one structural lock held only for the map
//! operation; population itself runs on a spawned worker task. Failed
//! populations stay cached until evicted, so a repeatedly failing key
//! cannot hammer the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{RegionCacheConfig, RegionCacheError, RegionCacheKey};
use crate::geojson::FeatureCollection;
use crate::memory::{Depressurizable, MemoryGovernor};
use crate::metrics::CacheMetrics;
use crate::soda::{build_region_query, check_response, RemoteDataset, GEOJSON_FORMAT};

/// Handle to a resolved-or-in-flight cache entry.
///
/// Awaiting yields the built index or the population failure; dropping the
/// handle never cancels the population, other waiters may depend on it.
pub type EntryFuture<I> = Shared<BoxFuture<'static, Result<Arc<I>, RegionCacheError>>>;

/// The hooks distinguishing one cache flavor from another.
///
/// The cache orchestration (single-flight, eviction, metrics) is shared;
/// implementations decide how raw features become an index and what an
/// index weighs for eviction purposes.
pub trait IndexBuilder: Send + Sync + 'static {
    /// The index type this builder produces.
    type Index: Send + Sync + 'static;

    /// Stable name used for logging and metric registration.
    fn cache_name(&self) -> &'static str;

    /// Builds an index from caller-provided in-memory features.
    fn build_from_features(
        &self,
        collection: &FeatureCollection,
        column: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError>;

    /// Builds an index from a GeoJSON document fetched from the backend.
    fn build_from_feature_json(
        &self,
        collection: &FeatureCollection,
        resource: &str,
        key_attr: &str,
        value_attr: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError>;

    /// Eviction size metric for a built index.
    fn size_of(&self, index: &Self::Index) -> usize;

    /// Pre-population checkpoint; the default is a no-op.
    fn prep_for_caching(
        &self,
        governor: &MemoryGovernor,
        min_free_pct: u64,
    ) -> Result<(), RegionCacheError> {
        let _ = (governor, min_free_pct);
        Ok(())
    }
}

struct Slot<I> {
    future: EntryFuture<I>,
    last_accessed: Instant,
}

impl<I> Slot<I> {
    fn new(future: EntryFuture<I>) -> Self {
        Self {
            future,
            last_accessed: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

struct CacheInner<B: IndexBuilder> {
    builder: B,
    config: RegionCacheConfig,
    governor: Arc<MemoryGovernor>,
    slots: Mutex<HashMap<RegionCacheKey, Slot<B::Index>>>,
    metrics: Arc<CacheMetrics>,
}

/// Bounded, thread-safe, single-flight cache of region indices.
///
/// Cheap to clone; clones share the same slot table.
pub struct RegionCache<B: IndexBuilder> {
    inner: Arc<CacheInner<B>>,
}

impl<B: IndexBuilder> Clone for RegionCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: IndexBuilder> RegionCache<B> {
    /// Creates a cache with the given builder, configuration and governor.
    pub fn new(builder: B, config: RegionCacheConfig, governor: Arc<MemoryGovernor>) -> Self {
        let metrics = CacheMetrics::register(builder.cache_name());
        Self {
            inner: Arc::new(CacheInner {
                builder,
                config,
                governor,
                slots: Mutex::new(HashMap::new()),
                metrics,
            }),
        }
    }

    /// Returns the entry for `key`, populating it from caller-provided
    /// features if absent.
    ///
    /// Lookup-and-install is atomic: concurrent callers for one key
    /// observe exactly one build.
    pub fn get_from_features(
        &self,
        key: RegionCacheKey,
        features: FeatureCollection,
    ) -> EntryFuture<B::Index> {
        let mut slots = self.inner.lock_slots();
        if let Some(slot) = slots.get_mut(&key) {
            slot.touch();
            return slot.future.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            inner.builder.prep_for_caching(
                &inner.governor,
                inner.config.min_free_percentage,
            )?;

            let mut pace = pacing_hook(&inner);
            let started = Instant::now();
            let index = inner
                .builder
                .build_from_features(&features, &task_key.column, &mut pace)?;
            inner.metrics.record_build(started.elapsed());
            debug!(
                key = %task_key,
                size = inner.builder.size_of(&index),
                "built region index from provided features"
            );
            Ok(Arc::new(index))
        });

        let future = wrap_population(handle);
        self.inner.install(&mut slots, key, future.clone());
        future
    }

    /// Returns the entry for `key`, populating it from the remote dataset
    /// if absent.
    ///
    /// Population fetches the dataset as GeoJSON (narrowed to the key's
    /// envelope when set), validates the response, and builds the index.
    /// Fetch and build are timed separately.
    pub fn get_from_soda<D>(
        &self,
        remote: Arc<D>,
        key: RegionCacheKey,
        value_column: &str,
    ) -> EntryFuture<B::Index>
    where
        D: RemoteDataset + 'static,
    {
        let mut slots = self.inner.lock_slots();
        if let Some(slot) = slots.get_mut(&key) {
            slot.touch();
            return slot.future.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let value_column = value_column.to_string();
        let handle = tokio::spawn(async move {
            inner.builder.prep_for_caching(
                &inner.governor,
                inner.config.min_free_percentage,
            )?;

            let soql = build_region_query(&task_key.column, task_key.envelope.as_ref());
            let started = Instant::now();
            let result = remote
                .query(&task_key.resource, GEOJSON_FORMAT, &soql)
                .await;
            inner.metrics.record_fetch(started.elapsed());

            let json = check_response(result, 200)?;
            let collection = FeatureCollection::from_json(&json)?;

            let mut pace = pacing_hook(&inner);
            let started = Instant::now();
            let index = inner.builder.build_from_feature_json(
                &collection,
                &task_key.resource,
                &task_key.column,
                &value_column,
                &mut pace,
            )?;
            inner.metrics.record_build(started.elapsed());
            debug!(
                key = %task_key,
                size = inner.builder.size_of(&index),
                "built region index from remote dataset"
            );
            Ok(Arc::new(index))
        });

        let future = wrap_population(handle);
        self.inner.install(&mut slots, key, future.clone());
        future
    }

    /// Snapshot of resolved entries sorted by size, descending.
    ///
    /// In-flight and failed entries are omitted. The list reflects a real
    /// past state; entries added during iteration may or may not appear.
    pub fn indices_by_size_desc(&self) -> Vec<(String, usize)> {
        let slots = self.inner.lock_slots();
        let mut sizes: Vec<(String, usize)> = slots
            .iter()
            .filter_map(|(key, slot)| match slot.future.peek() {
                Some(Ok(index)) => Some((key.to_string(), self.inner.builder.size_of(index))),
                _ => None,
            })
            .collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1));
        sizes
    }

    /// Removes every entry.
    ///
    /// Safe to call with populations in flight: they keep running for
    /// their waiters, but their results are no longer cached.
    pub fn reset(&self) {
        let mut slots = self.inner.lock_slots();
        let removed = slots.len();
        slots.clear();
        self.inner.metrics.set_entries(0);
        info!(removed, cache = self.inner.builder.cache_name(), "cache reset");
    }

    /// Number of cached slots, in-flight included.
    pub fn len(&self) -> usize {
        self.inner.lock_slots().len()
    }

    /// True when no slots are cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock_slots().is_empty()
    }
}

impl<B: IndexBuilder> CacheInner<B> {
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<RegionCacheKey, Slot<B::Index>>> {
        self.slots.lock().unwrap()
    }

    /// Installs a slot and enforces the LRU capacity bound before the
    /// structural lock is released.
    fn install(
        &self,
        slots: &mut HashMap<RegionCacheKey, Slot<B::Index>>,
        key: RegionCacheKey,
        future: EntryFuture<B::Index>,
    ) {
        slots.insert(key, Slot::new(future));

        while slots.len() > self.config.max_entries {
            let victim = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_accessed)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    slots.remove(&key);
                    debug!(key = %key, "evicted least-recently-used cache entry");
                }
                None => break,
            }
        }

        self.metrics.set_entries(slots.len());
    }
}

impl<B: IndexBuilder> Depressurizable for CacheInner<B> {
    /// Evicts the resolved entry with the smallest size metric, ties
    /// broken by least-recently-used. In-flight and failed entries carry
    /// no size and are never pressure-eviction victims.
    fn evict_smallest(&self) -> Option<(String, usize)> {
        let mut slots = self.lock_slots();
        let victim = slots
            .iter()
            .filter_map(|(key, slot)| {
                slot.future
                    .peek()
                    .and_then(|result| result.as_ref().ok())
                    .map(|index| (key.clone(), self.builder.size_of(index), slot.last_accessed))
            })
            .min_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))?;

        slots.remove(&victim.0);
        self.metrics.set_entries(slots.len());
        Some((victim.0.to_string(), victim.1))
    }
}

impl<B: IndexBuilder> Depressurizable for RegionCache<B> {
    fn evict_smallest(&self) -> Option<(String, usize)> {
        self.inner.evict_smallest()
    }
}

/// Per-1,000-features hook handed to the decoders: under pressure it
/// sheds the cache's smallest entries through the governor.
fn pacing_hook<B: IndexBuilder>(inner: &Arc<CacheInner<B>>) -> impl FnMut() {
    let inner = Arc::clone(inner);
    move || {
        if inner.config.enable_depressurize
            && !inner.governor.at_least_free(inner.config.min_free_percentage)
        {
            inner.governor.depressurize(&*inner);
        }
    }
}

/// Adapts a spawned population task into the shared entry future. A task
/// that dies (panic or runtime shutdown) resolves as a failed population.
fn wrap_population<I>(handle: JoinHandle<Result<Arc<I>, RegionCacheError>>) -> EntryFuture<I>
where
    I: Send + Sync + 'static,
{
    async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegionCacheError::BuildFailed(e.to_string())),
        }
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGovernorConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Builder counting its invocations; the "index" is the feature count.
    struct CountingBuilder {
        name: &'static str,
        builds: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingBuilder {
        fn new(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let builds = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    builds: builds.clone(),
                    fail: false,
                },
                builds,
            )
        }

        fn failing(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let builds = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    builds: builds.clone(),
                    fail: true,
                },
                builds,
            )
        }
    }

    impl IndexBuilder for CountingBuilder {
        type Index = usize;

        fn cache_name(&self) -> &'static str {
            self.name
        }

        fn build_from_features(
            &self,
            collection: &FeatureCollection,
            _column: &str,
            _pace: &mut dyn FnMut(),
        ) -> Result<usize, RegionCacheError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RegionCacheError::GeoJsonFormat("synthetic failure".into()));
            }
            Ok(collection.features.len())
        }

        fn build_from_feature_json(
            &self,
            collection: &FeatureCollection,
            _resource: &str,
            _key_attr: &str,
            _value_attr: &str,
            pace: &mut dyn FnMut(),
        ) -> Result<usize, RegionCacheError> {
            self.build_from_features(collection, "", pace)
        }

        fn size_of(&self, index: &usize) -> usize {
            *index
        }
    }

    fn test_governor() -> Arc<MemoryGovernor> {
        // Never under pressure
        let config = MemoryGovernorConfig::default().with_limit_bytes(1024 * 1024 * 1024);
        Arc::new(MemoryGovernor::with_probe(config, || 0))
    }

    fn cache_with(
        builder: CountingBuilder,
        config: RegionCacheConfig,
    ) -> RegionCache<CountingBuilder> {
        RegionCache::new(builder, config, test_governor())
    }

    fn features(count: usize) -> FeatureCollection {
        use crate::geo::Geometry;
        use crate::geojson::Feature;
        FeatureCollection {
            features: (0..count)
                .map(|i| {
                    Feature::new(Some(Geometry::point(i as f64, 0.0)), serde_json::Map::new())
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_population_resolves_with_built_index() {
        let (builder, builds) = CountingBuilder::new("core-populate");
        let cache = cache_with(builder, RegionCacheConfig::default());

        let key = RegionCacheKey::new("abcd-1234", "ward");
        let index = cache.get_from_features(key, features(7)).await.unwrap();
        assert_eq!(*index, 7);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_for_concurrent_callers() {
        let (builder, builds) = CountingBuilder::new("core-single-flight");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let key = RegionCacheKey::new("abcd-1234", "ward");

        let entry_futures: Vec<_> = (0..16)
            .map(|_| cache.get_from_features(key.clone(), features(3)))
            .collect();
        let results = futures::future::join_all(entry_futures).await;

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        let first = results[0].clone().unwrap();
        for result in results {
            // Every caller sees the same physical index
            assert!(Arc::ptr_eq(&first, &result.unwrap()));
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_across_tasks() {
        let (builder, builds) = CountingBuilder::new("core-tasks");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let key = RegionCacheKey::new("abcd-1234", "ward");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.get_from_features(key, features(3)).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_build_independently() {
        let (builder, builds) = CountingBuilder::new("core-distinct");
        let cache = cache_with(builder, RegionCacheConfig::default());

        cache
            .get_from_features(RegionCacheKey::new("a", "x"), features(1))
            .await
            .unwrap();
        cache
            .get_from_features(RegionCacheKey::new("b", "x"), features(2))
            .await
            .unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_population_is_negative_cached() {
        let (builder, builds) = CountingBuilder::failing("core-negative");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let key = RegionCacheKey::new("abcd-1234", "ward");

        let first = cache.get_from_features(key.clone(), features(1)).await;
        assert_eq!(
            first,
            Err(RegionCacheError::GeoJsonFormat("synthetic failure".into()))
        );

        // The failure is served from cache, not rebuilt
        let second = cache.get_from_features(key, features(1)).await;
        assert_eq!(first, second);
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // Failed entries never show up in the size snapshot
        assert!(cache.indices_by_size_desc().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let (builder, _) = CountingBuilder::new("core-capacity");
        let cache = cache_with(builder, RegionCacheConfig::default().with_max_entries(2));

        let key_a = RegionCacheKey::new("a", "x");
        let key_b = RegionCacheKey::new("b", "x");
        let key_c = RegionCacheKey::new("c", "x");

        cache
            .get_from_features(key_a.clone(), features(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache
            .get_from_features(key_b.clone(), features(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Touch the oldest entry so the other becomes the LRU victim
        cache
            .get_from_features(key_a.clone(), features(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        cache
            .get_from_features(key_c.clone(), features(3))
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        let names: Vec<String> = cache
            .indices_by_size_desc()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert!(names.contains(&key_a.to_string()));
        assert!(names.contains(&key_c.to_string()));
        assert!(!names.contains(&key_b.to_string()));
    }

    #[tokio::test]
    async fn test_capacity_bound_holds_while_overfilling() {
        let (builder, _) = CountingBuilder::new("core-bound");
        let cache = cache_with(builder, RegionCacheConfig::default().with_max_entries(3));

        for i in 0..10 {
            let key = RegionCacheKey::new(format!("resource-{}", i), "x");
            cache.get_from_features(key, features(i)).await.ok();
            assert!(cache.len() <= 3);
        }
    }

    #[tokio::test]
    async fn test_indices_by_size_desc_is_sorted() {
        let (builder, _) = CountingBuilder::new("core-sorted");
        let cache = cache_with(builder, RegionCacheConfig::default());

        for (resource, size) in [("zips", 9), ("wards", 51), ("first8", 8)] {
            cache
                .get_from_features(RegionCacheKey::new(resource, "geom"), features(size))
                .await
                .unwrap();
        }

        let sizes: Vec<usize> = cache
            .indices_by_size_desc()
            .into_iter()
            .map(|(_, size)| size)
            .collect();
        assert_eq!(sizes, vec![51, 9, 8]);
    }

    #[tokio::test]
    async fn test_reset_empties_cache_without_killing_inflight() {
        let (builder, _) = CountingBuilder::new("core-reset");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let key = RegionCacheKey::new("abcd-1234", "ward");

        let pending = cache.get_from_features(key, features(4));
        cache.reset();

        assert!(cache.is_empty());
        assert!(cache.indices_by_size_desc().is_empty());

        // The in-flight population still resolves for its waiter
        assert_eq!(*pending.await.unwrap(), 4);
        // ...but its result was discarded from the cache
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_evict_smallest_prefers_smallest_resolved_entry() {
        let (builder, _) = CountingBuilder::new("core-smallest");
        let cache = cache_with(builder, RegionCacheConfig::default());

        for (resource, size) in [("big", 51), ("mid", 9), ("small", 8)] {
            cache
                .get_from_features(RegionCacheKey::new(resource, "geom"), features(size))
                .await
                .unwrap();
        }

        let (key, size) = cache.evict_smallest().unwrap();
        assert_eq!(key, "small/geom");
        assert_eq!(size, 8);
        assert_eq!(cache.len(), 2);

        let (key, size) = cache.evict_smallest().unwrap();
        assert_eq!(key, "mid/geom");
        assert_eq!(size, 9);

        let (key, size) = cache.evict_smallest().unwrap();
        assert_eq!(key, "big/geom");
        assert_eq!(size, 51);

        assert!(cache.evict_smallest().is_none());
    }

    #[tokio::test]
    async fn test_gauge_tracks_entry_count() {
        let (builder, _) = CountingBuilder::new("core-gauge");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let metrics = CacheMetrics::register("core-gauge");

        cache
            .get_from_features(RegionCacheKey::new("a", "x"), features(1))
            .await
            .unwrap();
        cache
            .get_from_features(RegionCacheKey::new("b", "x"), features(2))
            .await
            .unwrap();
        assert_eq!(metrics.snapshot().entries, 2);

        cache.reset();
        assert_eq!(metrics.snapshot().entries, 0);
    }

    #[tokio::test]
    async fn test_build_timer_records_on_features_path() {
        let (builder, _) = CountingBuilder::new("core-build-timer");
        let cache = cache_with(builder, RegionCacheConfig::default());
        let metrics = CacheMetrics::register("core-build-timer");
        let before = metrics.snapshot().build_count;

        cache
            .get_from_features(RegionCacheKey::new("a", "x"), features(1))
            .await
            .unwrap();

        assert_eq!(metrics.snapshot().build_count, before + 1);
    }
}
