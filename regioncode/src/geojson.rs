//! GeoJSON feature collections as the wire schema for region datasets.
//!
//! The tabular backend serves curated regions as a `FeatureCollection`;
//! decoding is strict so a malformed document surfaces one precise
//! [`RegionCacheError::GeoJsonFormat`] instead of a half-built index.
//! Features carry their region attributes in `properties`, including the
//! conventional `_feature_id` used as the coded value.

use serde_json::{Map, Value};

use crate::cache::RegionCacheError;
use crate::geo::{Coordinate, Geometry, PolygonRings};

/// A parsed GeoJSON feature collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

/// A single GeoJSON feature.
///
/// A `null` geometry is preserved here; the feature decoder drops such
/// features with a warning rather than failing the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Creates a feature, mainly for tests and in-memory population.
    pub fn new(geometry: Option<Geometry>, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// String property accessor.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// Parses the conventional integer feature id from a property holding
    /// a string of digits.
    pub fn feature_id(&self, attr: &str) -> Option<i64> {
        let raw = self.property_str(attr)?;
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse().ok()
    }
}

impl FeatureCollection {
    /// Decodes a JSON document into a feature collection.
    pub fn from_json(json: &Value) -> Result<Self, RegionCacheError> {
        let obj = json
            .as_object()
            .ok_or_else(|| format_err("document is not a JSON object"))?;

        match obj.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {}
            Some(other) => {
                return Err(format_err(&format!(
                    "expected type FeatureCollection, got {}",
                    other
                )))
            }
            None => return Err(format_err("missing type member")),
        }

        let features = obj
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| format_err("missing features array"))?;

        let features = features
            .iter()
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { features })
    }
}

fn parse_feature(json: &Value) -> Result<Feature, RegionCacheError> {
    let obj = json
        .as_object()
        .ok_or_else(|| format_err("feature is not a JSON object"))?;

    let geometry = match obj.get("geometry") {
        None | Some(Value::Null) => None,
        Some(geom) => Some(parse_geometry(geom)?),
    };

    let properties = match obj.get("properties") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(format_err("feature properties is not an object")),
    };

    Ok(Feature {
        geometry,
        properties,
    })
}

fn parse_geometry(json: &Value) -> Result<Geometry, RegionCacheError> {
    let obj = json
        .as_object()
        .ok_or_else(|| format_err("geometry is not a JSON object"))?;

    let geom_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| format_err("geometry missing type member"))?;

    if !matches!(geom_type, "Point" | "Polygon" | "MultiPolygon") {
        return Err(format_err(&format!(
            "unsupported geometry type {}",
            geom_type
        )));
    }

    let coordinates = obj
        .get("coordinates")
        .ok_or_else(|| format_err(&format!("{} geometry missing coordinates", geom_type)))?;

    match geom_type {
        "Point" => Ok(Geometry::Point(parse_position(coordinates)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coordinates)?)),
        _ => {
            let parts = coordinates
                .as_array()
                .ok_or_else(|| format_err("MultiPolygon coordinates is not an array"))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::MultiPolygon(parts))
        }
    }
}

fn parse_polygon(json: &Value) -> Result<PolygonRings, RegionCacheError> {
    let rings = json
        .as_array()
        .ok_or_else(|| format_err("polygon coordinates is not an array"))?;
    if rings.is_empty() {
        return Err(format_err("polygon has no rings"));
    }

    let mut parsed = rings
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>, _>>()?;
    let exterior = parsed.remove(0);

    Ok(PolygonRings {
        exterior,
        holes: parsed,
    })
}

fn parse_ring(json: &Value) -> Result<Vec<Coordinate>, RegionCacheError> {
    json.as_array()
        .ok_or_else(|| format_err("polygon ring is not an array"))?
        .iter()
        .map(parse_position)
        .collect()
}

fn parse_position(json: &Value) -> Result<Coordinate, RegionCacheError> {
    let pos = json
        .as_array()
        .ok_or_else(|| format_err("position is not an array"))?;
    if pos.len() < 2 {
        return Err(format_err("position has fewer than 2 components"));
    }
    let x = pos[0]
        .as_f64()
        .ok_or_else(|| format_err("position component is not a number"))?;
    let y = pos[1]
        .as_f64()
        .ok_or_else(|| format_err("position component is not a number"))?;
    Ok(Coordinate::new(x, y))
}

fn format_err(detail: &str) -> RegionCacheError {
    RegionCacheError::GeoJsonFormat(detail.to_string())
}
