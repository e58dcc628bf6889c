//! Region geometries and containment predicates.
//!
//! Containment is boundary-inclusive: a point lying on a polygon edge or
//! vertex is contained. Region coding answers "which ward is this address
//! in", and addresses on a boundary must code to the region rather than
//! fall through the cracks.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

use super::{BoundingBox, Coordinate};

/// Errors raised when a geometry fails structural validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// A coordinate is NaN or infinite
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,

    /// A ring has fewer than four positions
    #[error("polygon ring must have at least 4 positions, got {0}")]
    MalformedRing(usize),

    /// A ring's first and last positions differ
    #[error("polygon ring is not closed")]
    UnclosedRing,

    /// A polygon has no exterior ring
    #[error("polygon has no exterior ring")]
    MissingExterior,

    /// An envelope's min corner exceeds its max corner
    #[error("envelope min corner exceeds max corner")]
    InvertedEnvelope,
}

/// The rings of a single polygon: one exterior plus zero or more holes.
///
/// Rings are closed coordinate sequences (first position repeated last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRings {
    pub exterior: Vec<Coordinate>,
    pub holes: Vec<Vec<Coordinate>>,
}

impl PolygonRings {
    /// Creates a polygon from its exterior ring with no holes.
    pub fn simple(exterior: Vec<Coordinate>) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    fn num_coordinates(&self) -> usize {
        self.exterior.len() + self.holes.iter().map(Vec::len).sum::<usize>()
    }

    fn validate(&self) -> Result<(), GeometryError> {
        if self.exterior.is_empty() {
            return Err(GeometryError::MissingExterior);
        }
        for ring in std::iter::once(&self.exterior).chain(self.holes.iter()) {
            if ring.len() < 4 {
                return Err(GeometryError::MalformedRing(ring.len()));
            }
            for c in ring {
                if !c.is_finite() {
                    return Err(GeometryError::NonFiniteCoordinate);
                }
            }
            if ring.first() != ring.last() {
                return Err(GeometryError::UnclosedRing);
            }
        }
        Ok(())
    }

    /// Boundary-inclusive point-in-polygon: on the exterior or a hole
    /// boundary counts as inside; strictly within a hole does not.
    fn contains_point(&self, p: &Coordinate) -> bool {
        if point_on_ring(p, &self.exterior) {
            return true;
        }
        if !point_in_ring(p, &self.exterior) {
            return false;
        }
        for hole in &self.holes {
            if point_on_ring(p, hole) {
                return true;
            }
            if point_in_ring(p, hole) {
                return false;
            }
        }
        true
    }
}

/// A geometry that can be spatially indexed or used as a query shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// A single point.
    Point(Coordinate),
    /// A polygon with optional holes.
    Polygon(PolygonRings),
    /// A collection of polygons treated as one region.
    MultiPolygon(Vec<PolygonRings>),
    /// An axis-aligned rectangle (query-side shape).
    Envelope(BoundingBox),
}

impl Geometry {
    /// Creates a point geometry.
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coordinate::new(x, y))
    }

    /// Creates a hole-free polygon from its exterior ring.
    pub fn polygon(exterior: Vec<Coordinate>) -> Self {
        Geometry::Polygon(PolygonRings::simple(exterior))
    }

    /// Creates an envelope geometry.
    pub fn envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Geometry::Envelope(BoundingBox::new(min_x, min_y, max_x, max_y))
    }

    /// Gets the minimum bounding rectangle of this geometry.
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Geometry::Point(c) => BoundingBox::of_point(c),
            Geometry::Polygon(rings) => BoundingBox::of_coordinates(&rings.exterior),
            Geometry::MultiPolygon(parts) => {
                let mut iter = parts.iter();
                let mut bbox = match iter.next() {
                    Some(first) => BoundingBox::of_coordinates(&first.exterior),
                    None => return BoundingBox::default(),
                };
                for part in iter {
                    bbox = bbox.union(&BoundingBox::of_coordinates(&part.exterior));
                }
                bbox
            }
            Geometry::Envelope(bbox) => *bbox,
        }
    }

    /// Total coordinate count across all rings and parts.
    ///
    /// Storage and query cost of an indexed region scale with this number,
    /// which makes it the cache's eviction size metric.
    pub fn num_coordinates(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::Polygon(rings) => rings.num_coordinates(),
            Geometry::MultiPolygon(parts) => parts.iter().map(|p| p.num_coordinates()).sum(),
            Geometry::Envelope(_) => 5,
        }
    }

    /// Checks the geometry is structurally sound: finite coordinates,
    /// closed rings of at least four positions, ordered envelope corners.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point(c) => {
                if !c.is_finite() {
                    return Err(GeometryError::NonFiniteCoordinate);
                }
                Ok(())
            }
            Geometry::Polygon(rings) => rings.validate(),
            Geometry::MultiPolygon(parts) => {
                if parts.is_empty() {
                    return Err(GeometryError::MissingExterior);
                }
                parts.iter().try_for_each(|p| p.validate())
            }
            Geometry::Envelope(bbox) => {
                if !(bbox.min_x.is_finite()
                    && bbox.min_y.is_finite()
                    && bbox.max_x.is_finite()
                    && bbox.max_y.is_finite())
                {
                    return Err(GeometryError::NonFiniteCoordinate);
                }
                if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
                    return Err(GeometryError::InvertedEnvelope);
                }
                Ok(())
            }
        }
    }

    /// Boundary-inclusive containment check.
    ///
    /// A polygon or multipolygon contains an extended shape when every
    /// vertex of that shape is contained; for the convex-cell region
    /// datasets this service indexes that coincides with true containment,
    /// and a query point (the dominant case) is always exact.
    pub fn contains(&self, other: &Geometry) -> bool {
        match other {
            Geometry::Point(p) => self.contains_coordinate(p),
            Geometry::Polygon(rings) => rings.exterior.iter().all(|c| self.contains_coordinate(c)),
            Geometry::MultiPolygon(parts) => parts
                .iter()
                .all(|p| p.exterior.iter().all(|c| self.contains_coordinate(c))),
            Geometry::Envelope(bbox) => bbox
                .exterior_ring()
                .iter()
                .all(|c| self.contains_coordinate(c)),
        }
    }

    fn contains_coordinate(&self, p: &Coordinate) -> bool {
        match self {
            Geometry::Point(c) => c.x == p.x && c.y == p.y,
            Geometry::Polygon(rings) => rings.contains_point(p),
            Geometry::MultiPolygon(parts) => parts.iter().any(|r| r.contains_point(p)),
            Geometry::Envelope(bbox) => bbox.contains_point(p.x, p.y),
        }
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(c) => write!(f, "POINT ({} {})", c.x, c.y),
            Geometry::Polygon(_) => write!(f, "POLYGON [{} coords]", self.num_coordinates()),
            Geometry::MultiPolygon(parts) => {
                write!(
                    f,
                    "MULTIPOLYGON [{} parts, {} coords]",
                    parts.len(),
                    self.num_coordinates()
                )
            }
            Geometry::Envelope(bbox) => write!(f, "ENVELOPE ({})", bbox),
        }
    }
}

/// Ray casting with crossing counts; boundary handling is done separately
/// by `point_on_ring`, so this is the strict-interior test.
fn point_in_ring(point: &Coordinate, ring: &[Coordinate]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;

    for i in 0..n {
        let xi = ring[i].x;
        let yi = ring[i].y;
        let xj = ring[j].x;
        let yj = ring[j].y;

        if ((yi > point.y) != (yj > point.y))
            && (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// True when the point lies on any segment of the ring.
fn point_on_ring(point: &Coordinate, ring: &[Coordinate]) -> bool {
    ring.windows(2)
        .any(|seg| point_on_segment(point, &seg[0], &seg[1]))
}

fn point_on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    // Collinearity tolerance scaled to the segment's extent
    let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
    if cross.abs() > f64::EPSILON * 16.0 * scale {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(10.0, 10.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_polygon_contains_interior_point() {
        let poly = Geometry::polygon(unit_square());
        assert!(poly.contains(&Geometry::point(5.0, 5.0)));
        assert!(!poly.contains(&Geometry::point(15.0, 5.0)));
    }

    #[test]
    fn test_polygon_contains_boundary_point() {
        let poly = Geometry::polygon(unit_square());
        // Edge midpoint and vertex both count as contained
        assert!(poly.contains(&Geometry::point(5.0, 0.0)));
        assert!(poly.contains(&Geometry::point(0.0, 0.0)));
        assert!(poly.contains(&Geometry::point(10.0, 10.0)));
    }

    #[test]
    fn test_polygon_with_hole() {
        let rings = PolygonRings {
            exterior: unit_square(),
            holes: vec![vec![
                Coordinate::new(4.0, 4.0),
                Coordinate::new(6.0, 4.0),
                Coordinate::new(6.0, 6.0),
                Coordinate::new(4.0, 6.0),
                Coordinate::new(4.0, 4.0),
            ]],
        };
        let poly = Geometry::Polygon(rings);

        assert!(poly.contains(&Geometry::point(2.0, 2.0)));
        // Strictly inside the hole is outside the polygon
        assert!(!poly.contains(&Geometry::point(5.0, 5.0)));
        // On the hole boundary is still on the polygon
        assert!(poly.contains(&Geometry::point(4.0, 5.0)));
    }

    #[test]
    fn test_multipolygon_contains() {
        let left = PolygonRings::simple(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(2.0, 0.0),
            Coordinate::new(2.0, 2.0),
            Coordinate::new(0.0, 2.0),
            Coordinate::new(0.0, 0.0),
        ]);
        let right = PolygonRings::simple(vec![
            Coordinate::new(5.0, 0.0),
            Coordinate::new(7.0, 0.0),
            Coordinate::new(7.0, 2.0),
            Coordinate::new(5.0, 2.0),
            Coordinate::new(5.0, 0.0),
        ]);
        let mp = Geometry::MultiPolygon(vec![left, right]);

        assert!(mp.contains(&Geometry::point(1.0, 1.0)));
        assert!(mp.contains(&Geometry::point(6.0, 1.0)));
        // Gap between the parts
        assert!(!mp.contains(&Geometry::point(3.5, 1.0)));
    }

    #[test]
    fn test_envelope_contains() {
        let env = Geometry::envelope(0.0, 0.0, 10.0, 10.0);
        assert!(env.contains(&Geometry::point(10.0, 0.0)));
        assert!(env.contains(&Geometry::envelope(1.0, 1.0, 9.0, 9.0)));
        assert!(!env.contains(&Geometry::envelope(5.0, 5.0, 11.0, 9.0)));
    }

    #[test]
    fn test_polygon_contains_envelope() {
        let poly = Geometry::polygon(unit_square());
        assert!(poly.contains(&Geometry::envelope(2.0, 2.0, 8.0, 8.0)));
        assert!(!poly.contains(&Geometry::envelope(5.0, 5.0, 15.0, 8.0)));
    }

    #[test]
    fn test_point_contains_point() {
        let p = Geometry::point(1.0, 2.0);
        assert!(p.contains(&Geometry::point(1.0, 2.0)));
        assert!(!p.contains(&Geometry::point(1.0, 2.1)));
    }

    #[test]
    fn test_bounding_box() {
        let poly = Geometry::polygon(unit_square());
        assert_eq!(poly.bounding_box(), BoundingBox::new(0.0, 0.0, 10.0, 10.0));

        let p = Geometry::point(3.0, 4.0);
        assert_eq!(p.bounding_box(), BoundingBox::new(3.0, 4.0, 3.0, 4.0));
    }

    #[test]
    fn test_num_coordinates() {
        assert_eq!(Geometry::point(0.0, 0.0).num_coordinates(), 1);
        assert_eq!(Geometry::polygon(unit_square()).num_coordinates(), 5);

        let rings = PolygonRings {
            exterior: unit_square(),
            holes: vec![unit_square()],
        };
        assert_eq!(Geometry::Polygon(rings).num_coordinates(), 10);
    }

    #[test]
    fn test_validate_accepts_sound_geometry() {
        assert!(Geometry::polygon(unit_square()).validate().is_ok());
        assert!(Geometry::point(1.0, 1.0).validate().is_ok());
        assert!(Geometry::envelope(0.0, 0.0, 1.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let result = Geometry::point(f64::NAN, 0.0).validate();
        assert_eq!(result, Err(GeometryError::NonFiniteCoordinate));
    }

    #[test]
    fn test_validate_rejects_short_ring() {
        let ring = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 0.0),
        ];
        let result = Geometry::polygon(ring).validate();
        assert_eq!(result, Err(GeometryError::MalformedRing(3)));
    }

    #[test]
    fn test_validate_rejects_unclosed_ring() {
        let ring = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(0.0, 1.0),
        ];
        let result = Geometry::polygon(ring).validate();
        assert_eq!(result, Err(GeometryError::UnclosedRing));
    }

    #[test]
    fn test_validate_rejects_empty_multipolygon() {
        let result = Geometry::MultiPolygon(vec![]).validate();
        assert_eq!(result, Err(GeometryError::MissingExterior));
    }

    #[test]
    fn test_validate_rejects_inverted_envelope() {
        let result = Geometry::envelope(5.0, 0.0, 1.0, 1.0).validate();
        assert_eq!(result, Err(GeometryError::InvertedEnvelope));
    }
}
