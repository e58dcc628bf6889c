//! Key-map region cache: attribute-to-id lookups keyed by a configured
//! string attribute.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{IndexBuilder, RegionCache, RegionCacheConfig, RegionCacheError};
use crate::decoder::{self, FEATURE_ID_PROPERTY};
use crate::geojson::FeatureCollection;
use crate::memory::{MemoryGovernor, MemoryGovernorConfig};

/// Cache of `key attribute -> feature id` maps.
pub type KeyMapRegionCache = RegionCache<KeyMapIndexer>;

/// Builder hooks for the key-map cache.
///
/// The size metric is the map's entry count; keys are short strings, so
/// entry count tracks the real footprint closely enough for eviction
/// ordering.
pub struct KeyMapIndexer;

impl KeyMapRegionCache {
    /// Creates a key-map cache with a default-probed governor.
    pub fn with_config(config: RegionCacheConfig) -> Self {
        let governor = MemoryGovernorConfig::default()
            .with_target_free_percentage(config.target_free_percentage)
            .with_iteration_interval(config.iteration_interval);
        RegionCache::new(
            KeyMapIndexer,
            config,
            Arc::new(MemoryGovernor::new(governor)),
        )
    }
}

impl IndexBuilder for KeyMapIndexer {
    type Index = HashMap<String, i64>;

    fn cache_name(&self) -> &'static str {
        "keymap-region-cache"
    }

    fn build_from_features(
        &self,
        collection: &FeatureCollection,
        column: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError> {
        Ok(decoder::to_key_map(
            collection,
            column,
            FEATURE_ID_PROPERTY,
            pace,
        ))
    }

    fn build_from_feature_json(
        &self,
        collection: &FeatureCollection,
        _resource: &str,
        key_attr: &str,
        _value_attr: &str,
        pace: &mut dyn FnMut(),
    ) -> Result<Self::Index, RegionCacheError> {
        Ok(decoder::to_key_map(
            collection,
            key_attr,
            FEATURE_ID_PROPERTY,
            pace,
        ))
    }

    fn size_of(&self, index: &Self::Index) -> usize {
        index.len()
    }
}
