//! Spatial region cache: R-tree indices keyed by geometry column.

use std::sync::Arc;

use crate::cache::{IndexBuilder, RegionCache, RegionCacheConfig, RegionCacheError};
use crate::decoder::{self, FEATURE_ID_PROPERTY};
use crate::geojson::FeatureCollection;
use crate::index::SpatialIndex;
use crate::memory::{MemoryGovernor, MemoryGovernorConfig};

/// Cache of [`SpatialIndex`] entries answering point/shape-in-region
/// queries.
pub type SpatialRegionCache = RegionCache<SpatialIndexer>;

/// Builder hooks for the spatial cache.
///
/// The size metric is the index's total coordinate count: storage and CPU
/// cost of a spatial entry scale with its vertices, not with feature
/// count, so a 10,000-vertex shoreline weighs more than a thousand simple
/// squares.
pub struct SpatialIndexer;

impl SpatialRegionCache {
    /// Creates a spatial cache with a default-probed governor.
    pub fn with_config(config: RegionCacheConfig) -> Self {
        let governor = MemoryGovernorConfig::default()
            .with_target_free_percentage(config.target_free_percentage)
            .with_iteration_interval(config.iteration_interval);
        RegionCache::new(
            SpatialIndexer,
            config,
            Arc::new(MemoryGovernor::new(governor)),
        )
    }
}

impl IndexBuilder for SpatialIndexer {
    type Index = SpatialIndex<i64>;

    fn cache_name(&self) -> &'static str {
        "spatial-region-cache"
    }

    fn build_from_features(
        &self,
        collection: &FeatureCollection,
        _column: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError> {
        let entries = decoder::to_spatial_entries(collection, FEATURE_ID_PROPERTY, pace);
        Ok(SpatialIndex::build(entries)?)
    }

    fn build_from_feature_json(
        &self,
        collection: &FeatureCollection,
        _resource: &str,
        _key_attr: &str,
        _value_attr: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError> {
        let entries = decoder::to_spatial_entries(collection, FEATURE_ID_PROPERTY, pace);
        Ok(SpatialIndex::build(entries)?)
    }

    fn size_of(&self, index: &Self::Index) -> usize {
        index.num_coordinates()
    }

    /// Spatial builds allocate per-vertex; refuse to start one when free
    /// memory is already below the trigger threshold.
    fn prep_for_caching(
        &self,
        governor: &MemoryGovernor,
        min_free_pct: u64,
    ) -> Result<(), RegionCacheError> {
        governor.ensure_free(min_free_pct, true)
    }
}
