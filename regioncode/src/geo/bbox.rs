use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// A 2D bounding box represented by minimum and maximum coordinates.
///
/// Used both as the coarse filter geometry inside the spatial index and as
/// the optional envelope narrowing a region cache key to a spatial window.
#[derive(Clone, Copy, PartialEq, Default, Debug, Deserialize, Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The degenerate box covering a single point.
    pub fn of_point(c: &Coordinate) -> BoundingBox {
        BoundingBox::new(c.x, c.y, c.x, c.y)
    }

    /// Smallest box covering a sequence of coordinates.
    ///
    /// Returns an all-zero box for an empty sequence.
    pub fn of_coordinates<'a>(coords: impl IntoIterator<Item = &'a Coordinate>) -> BoundingBox {
        let mut iter = coords.into_iter();
        let first = match iter.next() {
            Some(c) => c,
            None => return BoundingBox::default(),
        };
        let mut bbox = BoundingBox::of_point(first);
        for c in iter {
            bbox.expand_to(c);
        }
        bbox
    }

    /// Grows the box to cover the given coordinate.
    pub fn expand_to(&mut self, c: &Coordinate) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    /// Grows the box to cover another box.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Center of the box, used for STR packing.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Checks if a point lies inside the box; edges count as inside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if another box lies fully inside this one.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if two boxes overlap; touching edges count as overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Exterior ring of the box as a closed coordinate sequence,
    /// counter-clockwise from the lower-left corner.
    pub fn exterior_ring(&self) -> Vec<Coordinate> {
        vec![
            Coordinate::new(self.min_x, self.min_y),
            Coordinate::new(self.max_x, self.min_y),
            Coordinate::new(self.max_x, self.max_y),
            Coordinate::new(self.min_x, self.max_y),
            Coordinate::new(self.min_x, self.min_y),
        ]
    }

    /// Renders the box as a single-polygon MULTIPOLYGON in Well-Known Text.
    ///
    /// The tabular backend's `intersects(...)` predicate accepts
    /// MULTIPOLYGON but not POLYGON, so envelopes are always serialized in
    /// the wrapped form.
    pub fn to_wkt_multipolygon(&self) -> String {
        let ring = self
            .exterior_ring()
            .iter()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect::<Vec<_>>()
            .join(", ");
        format!("MULTIPOLYGON ((({})))", ring)
    }
}
