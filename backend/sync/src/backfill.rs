//! Resumable history backfill.
//!
//! A pass over one community runs in three phases:
//!
//! 1. **Boundary.** Resume point from the store (open checkpoint, else newest
//!    recorded activity), floored at `now - window`. The checkpoint is opened
//!    at that boundary.
//! 2. **Stream.** Every readable channel is paged oldest-first from just after
//!    the boundary, and each human-authored message becomes an upsert. Writes
//!    are newest-wins, so channels may be walked concurrently.
//! 3. **Finalize.** Only when every channel was walked to the end is the
//!    checkpoint finalized. Otherwise it is left open and the next pass
//!    resumes from the same boundary.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use lastseen_core::{ChannelId, CommunityId, EventSource, HistoryCursor, SourceError};
use lastseen_store::{StoreError, StoreHandle};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::readiness::{PendingBatch, ReadinessTracker};

/// How far back a first backfill reaches.
pub const DEFAULT_WINDOW_DAYS: i64 = 60;
/// Longest window accepted from configuration (ten years).
pub const MAX_WINDOW_DAYS: i64 = 3650;
pub const DEFAULT_CHANNEL_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Activity older than `now - window` is never fetched.
    pub window: Duration,
    /// Channels of one community walked at the same time.
    pub channel_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            window: Duration::days(DEFAULT_WINDOW_DAYS),
            channel_concurrency: DEFAULT_CHANNEL_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub channels_walked: usize,
    pub channels_skipped: usize,
    pub events_seen: u64,
    pub records_advanced: u64,
}

/// Why a pass stopped short of finalizing.
#[derive(Debug, Error)]
pub enum Interruption {
    #[error("could not read resume boundary: {0}")]
    Boundary(StoreError),

    #[error("could not open checkpoint: {0}")]
    Checkpoint(StoreError),

    #[error("could not list channels: {0}")]
    ChannelList(SourceError),

    #[error("{} channel(s) incomplete", .0.len())]
    Channels(Vec<ChannelId>),

    #[error("could not finalize checkpoint: {0}")]
    Finalize(StoreError),
}

#[derive(Debug)]
pub enum BackfillOutcome {
    /// Every channel walked and the checkpoint finalized.
    Completed(BackfillStats),
    /// The checkpoint is still open; a later pass resumes from it.
    Interrupted {
        stats: BackfillStats,
        reason: Interruption,
    },
}

impl BackfillOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BackfillOutcome::Completed(_))
    }

    pub fn stats(&self) -> BackfillStats {
        match self {
            BackfillOutcome::Completed(stats) => *stats,
            BackfillOutcome::Interrupted { stats, .. } => *stats,
        }
    }
}

#[derive(Debug, Error)]
enum ChannelFailure {
    #[error("history fetch failed: {0}")]
    Fetch(SourceError),
    #[error("store write failed: {0}")]
    Store(StoreError),
}

enum ChannelResult {
    Walked { events_seen: u64, records_advanced: u64 },
    Skipped,
    Failed(ChannelFailure),
}

pub struct Backfiller {
    source: Arc<dyn EventSource>,
    store: StoreHandle,
    settings: SyncSettings,
}

impl Backfiller {
    pub fn new(source: Arc<dyn EventSource>, store: StoreHandle, settings: SyncSettings) -> Self {
        Self { source, store, settings }
    }

    /// Mark `communities` pending, backfill them one by one and flip each to
    /// ready as soon as its pass completes. The readiness scope is held for the
    /// whole batch.
    pub async fn run_batch(
        &self,
        readiness: &ReadinessTracker,
        communities: Vec<CommunityId>,
    ) -> Vec<(CommunityId, BackfillOutcome)> {
        let batch = readiness.mark_pending(communities).await;
        self.drive(&batch).await
    }

    /// Backfill whatever `batch` covers, marking completed communities ready.
    pub async fn drive(&self, batch: &PendingBatch<'_>) -> Vec<(CommunityId, BackfillOutcome)> {
        let run_id = Uuid::new_v4();
        info!(%run_id, communities = batch.communities().len(), "Backfill batch started");

        let mut outcomes = Vec::with_capacity(batch.communities().len());
        for &community in batch.communities() {
            let outcome = self
                .backfill_community(community)
                .instrument(info_span!("backfill", %run_id, %community))
                .await;
            if outcome.is_completed() {
                batch.mark_ready(community);
            }
            outcomes.push((community, outcome));
        }

        let completed = outcomes.iter().filter(|(_, o)| o.is_completed()).count();
        info!(%run_id, completed, total = outcomes.len(), "Backfill batch finished");
        outcomes
    }

    pub async fn backfill_community(&self, community: CommunityId) -> BackfillOutcome {
        self.backfill_community_at(community, Utc::now()).await
    }

    /// One pass over `community`, with `now` as the reference for the window floor.
    pub async fn backfill_community_at(
        &self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> BackfillOutcome {
        let mut stats = BackfillStats::default();

        // Phase 1: boundary + open checkpoint.
        let boundary = match self.compute_boundary(community, now).await {
            Ok(boundary) => boundary,
            Err(e) => {
                error!(%community, error = %e, "Could not read resume boundary");
                return BackfillOutcome::Interrupted { stats, reason: Interruption::Boundary(e) };
            }
        };
        if let Err(e) = self.store.begin_checkpoint(community, boundary).await {
            error!(%community, error = %e, "Could not open checkpoint");
            return BackfillOutcome::Interrupted { stats, reason: Interruption::Checkpoint(e) };
        }
        info!(%community, %boundary, "Backfilling history");

        // Phase 2: stream every readable channel.
        let channels = match self.source.readable_channels(community).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(%community, error = %e, "Could not list channels, leaving checkpoint open");
                return BackfillOutcome::Interrupted { stats, reason: Interruption::ChannelList(e) };
            }
        };

        let results: Vec<(ChannelId, ChannelResult)> = stream::iter(channels)
            .map(|channel| async move {
                let result = self.walk_channel(community, channel, boundary).await;
                (channel, result)
            })
            .buffer_unordered(self.settings.channel_concurrency.max(1))
            .collect()
            .await;

        let mut failed = Vec::new();
        for (channel, result) in results {
            match result {
                ChannelResult::Walked { events_seen, records_advanced } => {
                    stats.channels_walked += 1;
                    stats.events_seen += events_seen;
                    stats.records_advanced += records_advanced;
                }
                ChannelResult::Skipped => stats.channels_skipped += 1,
                ChannelResult::Failed(e) => {
                    warn!(%community, %channel, error = %e, "Channel skipped for this pass");
                    failed.push(channel);
                }
            }
        }

        // Phase 3: finalize or leave open.
        if !failed.is_empty() {
            failed.sort();
            warn!(%community, failed = failed.len(), "Backfill incomplete, checkpoint left open");
            return BackfillOutcome::Interrupted { stats, reason: Interruption::Channels(failed) };
        }
        if let Err(e) = self.store.finalize_checkpoint(community).await {
            error!(%community, error = %e, "Could not finalize checkpoint");
            return BackfillOutcome::Interrupted { stats, reason: Interruption::Finalize(e) };
        }

        info!(
            %community,
            channels = stats.channels_walked,
            events = stats.events_seen,
            advanced = stats.records_advanced,
            "Backfill complete"
        );
        BackfillOutcome::Completed(stats)
    }

    /// `max(resume boundary, now - window)`.
    pub async fn compute_boundary(
        &self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let floor = now - self.settings.window;
        let boundary = match self.store.read_sync_boundary(community).await? {
            Some(resume) if resume > floor => resume,
            _ => floor,
        };
        Ok(boundary)
    }

    async fn walk_channel(
        &self,
        community: CommunityId,
        channel: ChannelId,
        boundary: DateTime<Utc>,
    ) -> ChannelResult {
        let mut cursor = HistoryCursor::Since(boundary);
        let mut events_seen = 0;
        let mut records_advanced = 0;

        loop {
            let page = match self.source.history_page(channel, cursor).await {
                Ok(page) => page,
                Err(SourceError::PermissionDenied(_)) => {
                    debug!(%community, %channel, "No history permission, skipping");
                    return ChannelResult::Skipped;
                }
                Err(e) => return ChannelResult::Failed(ChannelFailure::Fetch(e)),
            };

            let page_len = page.events.len();
            for event in page.events.into_iter().filter(|e| !e.automated) {
                events_seen += 1;
                match self
                    .store
                    .upsert_activity(community, event.member, event.display_name, event.at)
                    .await
                {
                    Ok(true) => records_advanced += 1,
                    Ok(false) => {}
                    Err(e) => return ChannelResult::Failed(ChannelFailure::Store(e)),
                }
            }

            match page.next {
                Some(next) if page_len > 0 => cursor = next,
                _ => break,
            }
        }

        debug!(%community, %channel, events_seen, records_advanced, "Channel walked");
        ChannelResult::Walked { events_seen, records_advanced }
    }
}
