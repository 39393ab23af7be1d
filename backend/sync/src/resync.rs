use std::sync::Arc;
use std::time::Duration;

use lastseen_core::CommunityId;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::backfill::Backfiller;
use crate::readiness::ReadinessTracker;

/// Retry backfill for every tracked community that is still not ready, once
/// per `every`, until `shutdown` flips to `true` or its sender goes away.
///
/// `tracked` yields the communities the bot currently belongs to.
pub async fn resync_loop<F>(
    backfiller: Arc<Backfiller>,
    readiness: Arc<ReadinessTracker>,
    every: Duration,
    tracked: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn() -> Vec<CommunityId> + Send + Sync,
{
    info!(every_secs = every.as_secs(), "Resync loop started");
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; startup already ran a batch.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let retried = resync_once(&backfiller, &readiness, tracked()).await;
                if retried > 0 {
                    info!(retried, "Resync pass finished");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Resync loop stopped");
}

/// One retry pass. Returns how many communities were backfilled again.
pub async fn resync_once(
    backfiller: &Backfiller,
    readiness: &ReadinessTracker,
    candidates: Vec<CommunityId>,
) -> usize {
    let unready: Vec<_> = candidates.into_iter().filter(|c| !readiness.is_ready(*c)).collect();
    if unready.is_empty() {
        debug!("All tracked communities ready");
        return 0;
    }
    match readiness.reclaim_unready(unready).await {
        Some(batch) => backfiller.drive(&batch).await.len(),
        None => 0,
    }
}
