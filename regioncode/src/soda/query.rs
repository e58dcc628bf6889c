use crate::geo::BoundingBox;

/// Response format requested for region dataset queries.
pub const GEOJSON_FORMAT: &str = "geojson";

/// Row cap sent with every region query; the backend rejects unlimited
/// selects.
const ROW_LIMIT: i64 = i32::MAX as i64;

/// Builds the SoQL query fetching a region dataset.
///
/// Selects every row up to the backend cap; when an envelope is given the
/// query narrows to features intersecting it. The envelope is serialized
/// as a single-polygon MULTIPOLYGON because the backend's `intersects`
/// predicate does not accept POLYGON literals.
pub fn build_region_query(column: &str, envelope: Option<&BoundingBox>) -> String {
    match envelope {
        Some(envelope) => format!(
            "select * where intersects({}, '{}') limit {}",
            column,
            envelope.to_wkt_multipolygon(),
            ROW_LIMIT
        ),
        None => format!("select * limit {}", ROW_LIMIT),
    }
}
