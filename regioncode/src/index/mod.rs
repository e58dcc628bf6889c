//! In-memory spatial indexing.

mod spatial;

pub use spatial::{SpatialEntry, SpatialIndex};
