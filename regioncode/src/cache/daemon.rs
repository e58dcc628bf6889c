//! Background daemon for memory-driven cache eviction.
//!
//! The daemon polls the memory governor on the configured interval and,
//! while free memory sits below the trigger threshold, sheds the cache's
//! smallest entries until the governor's target is met. It shares the
//! eviction primitive and the smallest-first policy with the inline
//! per-1,000-features hook.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::RegionCacheConfig;
use crate::memory::{Depressurizable, MemoryGovernor};

/// Background depressurization loop for one cache.
///
/// Started only when `enable_depressurize` is set; a daemon for a cache
/// with depressurization disabled is inert. Shut down via [`shutdown`]
/// followed by [`join`], or cancel-and-forget on drop.
///
/// [`shutdown`]: DepressurizeDaemon::shutdown
/// [`join`]: DepressurizeDaemon::join
pub struct DepressurizeDaemon {
    handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl DepressurizeDaemon {
    /// Starts the daemon for the given cache.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        cache: Arc<dyn Depressurizable>,
        governor: Arc<MemoryGovernor>,
        config: RegionCacheConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();

        if !config.enable_depressurize {
            debug!("depressurization disabled, daemon not started");
            return Self {
                handle: None,
                shutdown,
            };
        }

        let token = shutdown.clone();
        let interval = config.iteration_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("depressurize daemon received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !governor.at_least_free(config.min_free_percentage) {
                            let stats = governor.free_stats();
                            debug!(
                                free_pct = stats.free_pct,
                                min_pct = config.min_free_percentage,
                                "free memory below threshold, depressurizing"
                            );
                            governor.depressurize(&*cache);
                        }
                    }
                }
            }

            debug!("depressurize daemon stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "depressurize daemon started");

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Signals the daemon to stop.
    ///
    /// Non-blocking; the loop exits at its next poll. Call [`join`] to
    /// wait for the task to finish.
    ///
    /// [`join`]: DepressurizeDaemon::join
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits for the daemon task to finish.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("depressurize daemon task panicked: {:?}", e);
            }
        }
    }

    /// Whether the daemon task is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DepressurizeDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}
