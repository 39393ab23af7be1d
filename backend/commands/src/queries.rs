//! Read side of the activity store, as seen by commands.
//!
//! Every read except [`ActivityQueries::is_ready`] refuses with
//! [`CommandError::StillSyncing`] until the community's backfill has completed,
//! so a command can never answer from a half-filled table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lastseen_core::{CommunityId, MemberId};
use lastseen_store::{ActivityRecord, StoreHandle, SyncCheckpoint};
use lastseen_sync::ReadinessTracker;
use tracing::debug;

use crate::error::CommandError;

#[derive(Clone)]
pub struct ActivityQueries {
    store: StoreHandle,
    readiness: Arc<ReadinessTracker>,
}

impl ActivityQueries {
    pub fn new(store: StoreHandle, readiness: Arc<ReadinessTracker>) -> Self {
        Self { store, readiness }
    }

    pub fn is_ready(&self, community: CommunityId) -> bool {
        self.readiness.is_ready(community)
    }

    fn ensure_ready(&self, community: CommunityId) -> Result<(), CommandError> {
        if self.is_ready(community) {
            Ok(())
        } else {
            debug!(%community, "Query refused, community still syncing");
            Err(CommandError::StillSyncing(community))
        }
    }

    pub async fn last_active(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<Option<DateTime<Utc>>, CommandError> {
        self.ensure_ready(community)?;
        Ok(self.store.read_last_active(community, member).await?)
    }

    pub async fn all_last_active(
        &self,
        community: CommunityId,
    ) -> Result<HashMap<MemberId, ActivityRecord>, CommandError> {
        self.ensure_ready(community)?;
        let records = self.store.read_all_last_active(community).await?;
        Ok(records.into_iter().map(|r| (r.member, r)).collect())
    }

    /// Persisted sync state. Not gated: it describes the sync itself.
    pub async fn checkpoint(
        &self,
        community: CommunityId,
    ) -> Result<Option<SyncCheckpoint>, CommandError> {
        Ok(self.store.read_checkpoint(community).await?)
    }

    /// Number of members with recorded activity. Not gated.
    pub async fn tracked_members(&self, community: CommunityId) -> Result<u64, CommandError> {
        Ok(self.store.count_activity(community).await?)
    }

    /// Drop a member's record (after a kick).
    pub async fn forget_member(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<bool, CommandError> {
        Ok(self.store.delete_member(community, member).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const G1: CommunityId = CommunityId(1);

    #[tokio::test]
    async fn reads_refused_until_ready() {
        let store = StoreHandle::in_memory().unwrap();
        let readiness = Arc::new(ReadinessTracker::new());
        let queries = ActivityQueries::new(store.clone(), readiness.clone());
        let at = Utc.timestamp_millis_opt(1_000).unwrap();
        store.upsert_activity(G1, MemberId(10), "alice", at).await.unwrap();

        let batch = readiness.mark_pending([G1]).await;
        assert!(matches!(
            queries.last_active(G1, MemberId(10)).await,
            Err(CommandError::StillSyncing(G1))
        ));
        assert!(matches!(queries.all_last_active(G1).await, Err(CommandError::StillSyncing(G1))));
        assert_eq!(queries.tracked_members(G1).await.unwrap(), 1);

        batch.mark_ready(G1);
        drop(batch);
        assert_eq!(queries.last_active(G1, MemberId(10)).await.unwrap(), Some(at));
        let all = queries.all_last_active(G1).await.unwrap();
        assert_eq!(all[&MemberId(10)].display_name, "alice");
    }
}
