use thiserror::Error;

use crate::geo::GeometryError;

/// Cache and population errors.
///
/// The enum is `Clone + PartialEq` because a failed population is delivered
/// through a shared future to every waiter on that key, and tests match on
/// exact variants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionCacheError {
    /// The remote fetcher failed below the HTTP layer
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a status other than the expected one
    #[error("unexpected response code {0}")]
    UnexpectedResponseCode(u16),

    /// The response carried no parseable JSON body
    #[error("response body was not parseable JSON")]
    JsonParse,

    /// The body parsed as JSON but is not a usable GeoJSON FeatureCollection
    #[error("malformed GeoJSON: {0}")]
    GeoJsonFormat(String),

    /// Free heap below the configured threshold at a checkpoint
    #[error("free heap {free_pct}% below required {min_pct}%")]
    OutOfMemoryPressure { free_pct: u64, min_pct: u64 },

    /// An entry geometry failed structural validation at build time
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// The population worker task died before resolving
    #[error("population task failed: {0}")]
    BuildFailed(String),
}
