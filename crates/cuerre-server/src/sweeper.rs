//! Background eviction of expired cache files
//!
//! Runs on a fixed interval and whenever a request asks for a sweep.
//! Requests never wait for it; repeated triggers while a sweep is pending
//! collapse into one.

use chrono::{Duration, Utc};
use file_blob_cache::{BlobCache, EvictionReport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Handle request handlers use to ask for a sweep
#[derive(Debug, Clone)]
pub struct SweepTrigger {
    tx: mpsc::Sender<()>,
}

impl SweepTrigger {
    /// A trigger and the receiving end for [`spawn_sweeper`]
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn trigger(&self) {
        // Full means a sweep is already pending; closed means no sweeper runs.
        let _ = self.tx.try_send(());
    }
}

/// Run one sweep, logging the outcome
pub async fn sweep_once(cache: &BlobCache, ttl: Duration) -> Option<EvictionReport> {
    match cache.evict_expired(Utc::now(), ttl).await {
        Ok(report) => {
            if report.evicted > 0 || report.failed > 0 {
                info!(
                    scanned = report.scanned,
                    evicted = report.evicted,
                    failed = report.failed,
                    busy = report.busy,
                    "Cache sweep finished"
                );
            } else {
                debug!(scanned = report.scanned, "Cache sweep found nothing to evict");
            }
            Some(report)
        }
        Err(e) => {
            error!(error = %e, "Cache sweep failed");
            None
        }
    }
}

/// Spawn the sweep loop. The first sweep runs immediately.
pub fn spawn_sweeper(
    cache: Arc<BlobCache>,
    ttl: Duration,
    interval: std::time::Duration,
    mut requests: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), ttl_secs = ttl.num_seconds(), "Cache sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(()) = requests.recv() => {}
            }
            sweep_once(&cache, ttl).await;
        }
    })
}
