//! regioncode - geo-region coding over curated region datasets.
//!
//! Maps geographic points and shapes to administrative or user-defined
//! regions (wards, zip codes, neighborhoods) described by GeoJSON feature
//! collections served from a SODA-style tabular backend. Coding must be
//! fast and repeatable, so per-dataset lookup structures are built once
//! and held in an in-memory, concurrent, memory-pressure-aware cache.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use regioncode::cache::{RegionCacheConfig, RegionCacheKey, SpatialRegionCache};
//! use regioncode::decoder::FEATURE_ID_PROPERTY;
//! use regioncode::geo::Geometry;
//! use regioncode::soda::SodaClient;
//!
//! let cache = SpatialRegionCache::with_config(RegionCacheConfig::default());
//! let soda = Arc::new(SodaClient::new("https://data.example.com")?);
//!
//! let key = RegionCacheKey::new("abcd-1234", "the_geom");
//! let index = cache.get_from_soda(soda, key, FEATURE_ID_PROPERTY).await?;
//!
//! if let Some(entry) = index.first_contains(&Geometry::point(-122.3, 47.6)) {
//!     println!("point codes to region {}", entry.value);
//! }
//! ```

pub mod cache;
pub mod decoder;
pub mod geo;
pub mod geojson;
pub mod index;
pub mod memory;
pub mod metrics;
pub mod soda;

/// Version of the regioncode library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
