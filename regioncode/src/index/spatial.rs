//! Bulk-loaded R-tree answering "which indexed regions contain this shape".
//!
//! The tree is packed once with Sort-Tile-Recursive loading and never
//! mutated afterwards, so query performance is independent of the order
//! entries arrived in. Queries run in two phases: bounding-box candidate
//! retrieval through the tree, then exact containment refinement against
//! the candidate geometries. The exact predicate is authoritative; MBR
//! matches that fail it are discarded.

use crate::geo::{BoundingBox, Geometry, GeometryError};

/// Entries per tree node.
const NODE_CAPACITY: usize = 16;

/// A geometry paired with the value it codes to.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry<T> {
    pub geometry: Geometry,
    pub value: T,
}

impl<T> SpatialEntry<T> {
    /// Creates a new entry.
    pub fn new(geometry: Geometry, value: T) -> Self {
        Self { geometry, value }
    }
}

#[derive(Debug, PartialEq)]
enum Node {
    Leaf {
        bbox: BoundingBox,
        // (entry MBR, index into SpatialIndex::entries)
        entries: Vec<(BoundingBox, u32)>,
    },
    Inner {
        bbox: BoundingBox,
        children: Vec<Node>,
    },
}

impl Node {
    fn bbox(&self) -> &BoundingBox {
        match self {
            Node::Leaf { bbox, .. } => bbox,
            Node::Inner { bbox, .. } => bbox,
        }
    }
}

/// Immutable STR-packed R-tree of `(Geometry, value)` entries.
#[derive(Debug, PartialEq)]
pub struct SpatialIndex<T> {
    entries: Vec<SpatialEntry<T>>,
    root: Option<Node>,
    num_coordinates: usize,
}

impl<T> SpatialIndex<T> {
    /// Bulk-loads an index from a finite sequence of entries.
    ///
    /// An empty sequence is legal and produces an empty index. Degenerate
    /// geometries (non-finite coordinates, malformed rings) fail the build.
    pub fn build(entries: Vec<SpatialEntry<T>>) -> Result<Self, GeometryError> {
        for entry in &entries {
            entry.geometry.validate()?;
        }

        let num_coordinates = entries.iter().map(|e| e.geometry.num_coordinates()).sum();

        let root = if entries.is_empty() {
            None
        } else {
            let leaf_items: Vec<(BoundingBox, u32)> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.geometry.bounding_box(), i as u32))
                .collect();

            let mut nodes: Vec<Node> = str_pack(leaf_items)
                .into_iter()
                .map(|(bbox, group)| Node::Leaf {
                    bbox,
                    entries: group,
                })
                .collect();

            while nodes.len() > 1 {
                let items: Vec<(BoundingBox, Node)> =
                    nodes.into_iter().map(|n| (*n.bbox(), n)).collect();
                nodes = str_pack(items)
                    .into_iter()
                    .map(|(bbox, children)| Node::Inner {
                        bbox,
                        children: children.into_iter().map(|(_, node)| node).collect(),
                    })
                    .collect();
            }

            nodes.pop()
        };

        Ok(Self {
            entries,
            root,
            num_coordinates,
        })
    }

    /// Returns every entry whose geometry contains `shape`.
    ///
    /// Order is unspecified.
    pub fn what_contains(&self, shape: &Geometry) -> Vec<&SpatialEntry<T>> {
        let mut matches = Vec::new();
        if let Some(root) = &self.root {
            let query_bbox = shape.bounding_box();
            self.collect_containing(root, &query_bbox, shape, &mut matches);
        }
        matches
    }

    /// Returns any one entry whose geometry contains `shape`.
    ///
    /// Short-circuits the tree descent on the first exact match.
    pub fn first_contains(&self, shape: &Geometry) -> Option<&SpatialEntry<T>> {
        let root = self.root.as_ref()?;
        let query_bbox = shape.bounding_box();
        self.find_containing(root, &query_bbox, shape)
    }

    /// Total coordinate count across all entry geometries.
    pub fn num_coordinates(&self) -> usize {
        self.num_coordinates
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect_containing<'a>(
        &'a self,
        node: &'a Node,
        query_bbox: &BoundingBox,
        shape: &Geometry,
        matches: &mut Vec<&'a SpatialEntry<T>>,
    ) {
        match node {
            Node::Leaf { bbox, entries } => {
                if !bbox.intersects(query_bbox) {
                    return;
                }
                for (entry_bbox, idx) in entries {
                    // An entry can only contain the shape if its MBR covers
                    // the shape's MBR
                    if entry_bbox.contains_box(query_bbox) {
                        let entry = &self.entries[*idx as usize];
                        if entry.geometry.contains(shape) {
                            matches.push(entry);
                        }
                    }
                }
            }
            Node::Inner { bbox, children } => {
                if !bbox.intersects(query_bbox) {
                    return;
                }
                for child in children {
                    self.collect_containing(child, query_bbox, shape, matches);
                }
            }
        }
    }

    fn find_containing<'a>(
        &'a self,
        node: &'a Node,
        query_bbox: &BoundingBox,
        shape: &Geometry,
    ) -> Option<&'a SpatialEntry<T>> {
        match node {
            Node::Leaf { bbox, entries } => {
                if !bbox.intersects(query_bbox) {
                    return None;
                }
                for (entry_bbox, idx) in entries {
                    if entry_bbox.contains_box(query_bbox) {
                        let entry = &self.entries[*idx as usize];
                        if entry.geometry.contains(shape) {
                            return Some(entry);
                        }
                    }
                }
                None
            }
            Node::Inner { bbox, children } => {
                if !bbox.intersects(query_bbox) {
                    return None;
                }
                children
                    .iter()
                    .find_map(|child| self.find_containing(child, query_bbox, shape))
            }
        }
    }
}

/// One level of Sort-Tile-Recursive packing: sorts items by center x,
/// cuts them into vertical slices, sorts each slice by center y, and
/// chunks the slices into groups of at most `NODE_CAPACITY`. Each group
/// keeps the items' own boxes and carries the group's union box.
fn str_pack<I>(mut items: Vec<(BoundingBox, I)>) -> Vec<(BoundingBox, Vec<(BoundingBox, I)>)> {
    let n = items.len();
    let group_count = n.div_ceil(NODE_CAPACITY);
    let slice_count = (group_count as f64).sqrt().ceil() as usize;
    let slice_size = n.div_ceil(slice_count);

    items.sort_by(|a, b| {
        let ax = a.0.center().x;
        let bx = b.0.center().x;
        ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut groups = Vec::with_capacity(group_count);
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let mut slice: Vec<(BoundingBox, I)> = items.by_ref().take(slice_size).collect();
        slice.sort_by(|a, b| {
            let ay = a.0.center().y;
            let by = b.0.center().y;
            ay.partial_cmp(&by).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut slice = slice.into_iter().peekable();
        while slice.peek().is_some() {
            let chunk: Vec<(BoundingBox, I)> = slice.by_ref().take(NODE_CAPACITY).collect();
            let mut bbox = chunk[0].0;
            for (item_bbox, _) in &chunk[1..] {
                bbox = bbox.union(item_bbox);
            }
            groups.push((bbox, chunk));
        }
    }

    groups
}
