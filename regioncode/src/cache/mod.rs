//! The region cache: bounded, concurrent, single-flight, memory-aware.
//!
//! Two flavors share the orchestration in [`RegionCache`] and differ only
//! in their [`IndexBuilder`] hooks: [`SpatialRegionCache`] holds R-tree
//! indices for point/shape-in-region queries, [`KeyMapRegionCache`] holds
//! attribute-to-id maps.

mod config;
mod core;
mod daemon;
mod error;
mod key;
mod keymap;
mod spatial;

pub use self::core::{EntryFuture, IndexBuilder, RegionCache};
pub use config::RegionCacheConfig;
pub use daemon::DepressurizeDaemon;
pub use error::RegionCacheError;
pub use key::RegionCacheKey;
pub use keymap::{KeyMapIndexer, KeyMapRegionCache};
pub use spatial::{SpatialIndexer, SpatialRegionCache};
