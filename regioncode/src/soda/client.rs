//! Production SODA client over reqwest.

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{RemoteDataset, SodaResult};
use crate::cache::RegionCacheError;

const DEFAULT_USER_AGENT: &str = concat!("regioncode/", env!("CARGO_PKG_VERSION"));

/// Async SODA client.
///
/// Tuned for bulk dataset pulls: a warm connection pool, TCP keepalive and
/// nodelay, and a generous per-request timeout. Transport problems are
/// reported as `SodaResult::Failed`; a body that is not JSON becomes a
/// `Response` with no body so the caller's response check decides the
/// outcome.
#[derive(Clone)]
pub struct SodaClient {
    client: reqwest::Client,
    base_url: String,
}

impl SodaClient {
    /// Creates a client for the given backend base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RegionCacheError> {
        Self::with_timeout(base_url, 60)
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, RegionCacheError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                RegionCacheError::Transport(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl RemoteDataset for SodaClient {
    async fn query(&self, resource: &str, format: &str, soql: &str) -> SodaResult {
        let url = format!(
            "{}/resource/{}.{}",
            self.base_url.trim_end_matches('/'),
            resource,
            format
        );
        trace!(url = %url, soql = soql, "dataset query starting");

        let response = match self
            .client
            .get(&url)
            .query(&[("$query", soql)])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "dataset query failed"
                );
                return SodaResult::Failed(RegionCacheError::Transport(format!(
                    "request failed: {}",
                    e
                )));
            }
        };

        let status = response.status().as_u16();
        debug!(url = %url, status, "dataset response received");

        match response.json::<Value>().await {
            Ok(body) => SodaResult::Response {
                status,
                body: Some(body),
            },
            Err(_) => SodaResult::Response { status, body: None },
        }
    }
}
