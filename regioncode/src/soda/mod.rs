//! Remote tabular-data backend access.
//!
//! The cache depends on one seam: a [`RemoteDataset`] that answers a
//! `(resource, format, query)` triple with a [`SodaResult`]. The
//! reqwest-backed [`SodaClient`] is the production implementation; tests
//! inject mocks.

mod client;
mod query;
mod response;

pub use client::SodaClient;
pub use query::{build_region_query, GEOJSON_FORMAT};
pub use response::{check_response, SodaResult};

use std::future::Future;

/// Fetcher for curated region datasets.
pub trait RemoteDataset: Send + Sync {
    /// Issues a query against `resource`, requesting the given response
    /// format.
    ///
    /// Transport failures are reported inside the returned [`SodaResult`],
    /// never as a panic; the caller decides how response codes and bodies
    /// are interpreted.
    fn query(
        &self,
        resource: &str,
        format: &str,
        soql: &str,
    ) -> impl Future<Output = SodaResult> + Send;
}
