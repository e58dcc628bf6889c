//! Feature decoding: GeoJSON feature collections to cache-ready entries.
//!
//! Pure translation with drop-and-log data-quality handling: features
//! missing the id or key attribute never fail a build, they are skipped.
//! Both decoders invoke a pacing hook once per [`PACING_STRIDE`] features
//! so long-running builds can interleave with memory reclamation.

use std::collections::HashMap;

use tracing::warn;

use crate::geojson::FeatureCollection;
use crate::index::SpatialEntry;

/// Conventional property holding the integer id a region codes to.
pub const FEATURE_ID_PROPERTY: &str = "_feature_id";

/// Features processed between pacing-hook invocations.
pub const PACING_STRIDE: usize = 1_000;

/// Converts features into spatial entries valued by their feature id.
///
/// Features lacking a geometry or a parseable integer at `feature_id_attr`
/// are skipped with a warning. Geometry is carried as-is.
pub fn to_spatial_entries(
    collection: &FeatureCollection,
    feature_id_attr: &str,
    mut pace: impl FnMut(),
) -> Vec<SpatialEntry<i64>> {
    let mut entries = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.iter().enumerate() {
        if (i + 1) % PACING_STRIDE == 0 {
            pace();
        }

        let id = match feature.feature_id(feature_id_attr) {
            Some(id) => id,
            None => {
                warn!(
                    attribute = feature_id_attr,
                    position = i,
                    "skipping feature without a parseable id"
                );
                continue;
            }
        };
        let geometry = match &feature.geometry {
            Some(geometry) => geometry.clone(),
            None => {
                warn!(position = i, "skipping feature without a geometry");
                continue;
            }
        };

        entries.push(SpatialEntry::new(geometry, id));
    }

    entries
}

/// Converts features into a `key attribute -> feature id` map.
///
/// Features missing either attribute are silently skipped; duplicate keys
/// collapse with last-writer-wins.
pub fn to_key_map(
    collection: &FeatureCollection,
    key_attr: &str,
    feature_id_attr: &str,
    mut pace: impl FnMut(),
) -> HashMap<String, i64> {
    let mut map = HashMap::new();

    for (i, feature) in collection.features.iter().enumerate() {
        if (i + 1) % PACING_STRIDE == 0 {
            pace();
        }

        let key = match feature.property_str(key_attr) {
            Some(key) => key,
            None => continue,
        };
        let id = match feature.feature_id(feature_id_attr) {
            Some(id) => id,
            None => continue,
        };

        map.insert(key.to_string(), id);
    }

    map
}
