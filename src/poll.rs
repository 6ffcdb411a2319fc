//! Poller: periodic revalidation gated on visibility.
//!
//! DESIGN
//! ======
//! One background task refreshes a set of targets every interval while the
//! observer is visible. Visibility arrives on a `watch` channel: going
//! hidden stops refreshes (ticks are skipped, not queued), becoming visible
//! again refreshes right away and restarts the interval. The task exits
//! when the visibility sender is dropped.
//!
//! In-flight refreshes are never cancelled; a hidden observer just stops
//! issuing new ones.

#[cfg(test)]
#[path = "poll_test.rs"]
mod poll_test;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::RemoteCache;
use crate::net::{ApiError, Resource, RouteKey};

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(5000);

/// Something the poller can refresh.
#[async_trait::async_trait]
pub trait Refresh: Send + Sync {
    /// Name for logs.
    fn label(&self) -> String;

    async fn refresh(&self) -> Result<(), ApiError>;
}

/// One cached collection.
pub struct CacheTarget<T: Resource> {
    cache: RemoteCache<T>,
    key: RouteKey,
}

impl<T: Resource> CacheTarget<T> {
    #[must_use]
    pub fn new(cache: RemoteCache<T>, key: RouteKey) -> Arc<Self> {
        Arc::new(Self { cache, key })
    }
}

#[async_trait::async_trait]
impl<T: Resource> Refresh for CacheTarget<T> {
    fn label(&self) -> String {
        self.key.to_string()
    }

    async fn refresh(&self) -> Result<(), ApiError> {
        self.cache.revalidate(&self.key).await.map(|_| ())
    }
}

/// Visibility channel for a poller. Starts visible.
#[must_use]
pub fn visibility() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(true)
}

async fn refresh_all(targets: &[Arc<dyn Refresh>]) {
    let results = join_all(targets.iter().map(|t| t.refresh())).await;
    for (target, result) in targets.iter().zip(results) {
        if let Err(e) = result {
            // The cache already logged the failure at warn.
            debug!(target = %target.label(), error = %e, "poll refresh failed");
        }
    }
}

/// Spawn the polling task.
pub fn spawn_poller(
    targets: Vec<Arc<dyn Refresh>>,
    interval: Duration,
    mut visible: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(targets = targets.len(), ?interval, "poller started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *visible.borrow() {
                        refresh_all(&targets).await;
                    }
                }
                changed = visible.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_visible = *visible.borrow_and_update();
                    debug!(visible = now_visible, "poller visibility changed");
                    if now_visible {
                        refresh_all(&targets).await;
                        ticker.reset();
                    }
                }
            }
        }
        info!("poller stopped");
    })
}
