//! Per-community readiness gate.
//!
//! A community is ready once a backfill pass for it has completed. Anything
//! without an entry is not ready. Marking communities pending acquires the
//! tracker's batch scope; the returned [`PendingBatch`] holds that scope until
//! it is dropped, so the mark-pending step and the backfill loop that follows
//! cannot interleave with another batch.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use lastseen_core::CommunityId;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    NotReady,
    Ready,
}

#[derive(Default)]
pub struct ReadinessTracker {
    states: Mutex<HashMap<CommunityId, Readiness>>,
    scope: AsyncMutex<()>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<CommunityId, Readiness>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `communities` not ready and open a batch over them.
    ///
    /// Waits for any batch already in flight to finish first.
    pub async fn mark_pending(
        &self,
        communities: impl IntoIterator<Item = CommunityId>,
    ) -> PendingBatch<'_> {
        let scope = self.scope.lock().await;
        let communities: Vec<CommunityId> = communities.into_iter().collect();
        {
            let mut states = self.states();
            for community in &communities {
                states.insert(*community, Readiness::NotReady);
            }
        }
        debug!(count = communities.len(), "Communities marked pending");
        PendingBatch { tracker: self, _scope: scope, communities }
    }

    /// Open a batch over those `candidates` that are still not ready once the
    /// batch scope is held. Returns `None` when all of them became ready.
    pub async fn reclaim_unready(
        &self,
        candidates: impl IntoIterator<Item = CommunityId>,
    ) -> Option<PendingBatch<'_>> {
        let scope = self.scope.lock().await;
        let mut communities = Vec::new();
        {
            let mut states = self.states();
            for community in candidates {
                if states.get(&community) == Some(&Readiness::Ready) {
                    continue;
                }
                states.insert(community, Readiness::NotReady);
                communities.push(community);
            }
        }
        if communities.is_empty() {
            return None;
        }
        Some(PendingBatch { tracker: self, _scope: scope, communities })
    }

    /// Ready for commands? Unknown communities are not.
    pub fn is_ready(&self, community: CommunityId) -> bool {
        self.states().get(&community) == Some(&Readiness::Ready)
    }

    /// Stop tracking a community (e.g. the bot left it).
    pub fn forget(&self, community: CommunityId) {
        if self.states().remove(&community).is_some() {
            debug!(%community, "Community forgotten");
        }
    }
}

/// Communities marked pending together. Holds the tracker's batch scope.
pub struct PendingBatch<'a> {
    tracker: &'a ReadinessTracker,
    _scope: AsyncMutexGuard<'a, ()>,
    communities: Vec<CommunityId>,
}

impl PendingBatch<'_> {
    pub fn communities(&self) -> &[CommunityId] {
        &self.communities
    }

    /// Flip a community to ready. Has no effect on a community that was
    /// forgotten while the batch ran. Returns whether it is now ready.
    pub fn mark_ready(&self, community: CommunityId) -> bool {
        let mut states = self.tracker.states();
        match states.get_mut(&community) {
            Some(state) => {
                *state = Readiness::Ready;
                debug!(%community, "Community ready for commands");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const G1: CommunityId = CommunityId(1);
    const G2: CommunityId = CommunityId(2);

    #[tokio::test]
    async fn unknown_community_is_not_ready() {
        let tracker = ReadinessTracker::new();
        assert!(!tracker.is_ready(G1));
    }

    #[tokio::test]
    async fn pending_then_ready_then_forgotten() {
        let tracker = ReadinessTracker::new();
        {
            let batch = tracker.mark_pending([G1, G2]).await;
            assert_eq!(batch.communities(), &[G1, G2]);
            assert!(!tracker.is_ready(G1));
            assert!(batch.mark_ready(G1));
            assert!(tracker.is_ready(G1));
            assert!(!tracker.is_ready(G2));
        }

        tracker.forget(G1);
        assert!(!tracker.is_ready(G1));
    }

    #[tokio::test]
    async fn rescheduling_resets_to_not_ready() {
        let tracker = ReadinessTracker::new();
        tracker.mark_pending([G1]).await.mark_ready(G1);
        assert!(tracker.is_ready(G1));

        let _batch = tracker.mark_pending([G1]).await;
        assert!(!tracker.is_ready(G1));
    }

    #[tokio::test]
    async fn forgotten_mid_batch_is_not_resurrected() {
        let tracker = ReadinessTracker::new();
        let batch = tracker.mark_pending([G1]).await;
        tracker.forget(G1);
        assert!(!batch.mark_ready(G1));
        assert!(!tracker.is_ready(G1));
    }

    #[tokio::test]
    async fn second_batch_waits_for_first() {
        let tracker = Arc::new(ReadinessTracker::new());
        let first = tracker.mark_pending([G1]).await;

        let waiting = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let batch = tracker.mark_pending([G2]).await;
                batch.communities().to_vec()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        first.mark_ready(G1);
        drop(first);
        assert_eq!(waiting.await.unwrap(), vec![G2]);
    }

    #[tokio::test]
    async fn reader_never_sees_ready_before_backfill_completes() {
        let tracker = Arc::new(ReadinessTracker::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();

        let backfill = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let batch = tracker.mark_pending([G1, G2]).await;
                started_tx.send(()).unwrap();
                batch.mark_ready(G1);
                // G2's backfill is still running until the test lets it finish.
                finish_rx.await.unwrap();
                batch.mark_ready(G2);
            })
        };

        started_rx.await.unwrap();
        for _ in 0..50 {
            assert!(!tracker.is_ready(G2));
            tokio::task::yield_now().await;
        }
        finish_tx.send(()).unwrap();
        backfill.await.unwrap();
        assert!(tracker.is_ready(G1));
        assert!(tracker.is_ready(G2));
    }

    #[tokio::test]
    async fn reclaim_skips_communities_that_became_ready() {
        let tracker = ReadinessTracker::new();
        tracker.mark_pending([G1, G2]).await.mark_ready(G1);

        let batch = tracker.reclaim_unready([G1, G2]).await.unwrap();
        assert_eq!(batch.communities(), &[G2]);
        assert!(tracker.is_ready(G1));
        batch.mark_ready(G2);
        drop(batch);

        assert!(tracker.reclaim_unready([G1, G2]).await.is_none());
    }
}
