use async_trait::async_trait;
use thiserror::Error;

use crate::event::{HistoryCursor, HistoryPage};
use crate::types::{ChannelId, CommunityId, MemberId, MemberInfo};

#[derive(Debug, Error)]
pub enum SourceError {
    /// No read-history permission. Skipped silently by callers.
    #[error("no permission to read channel {0}")]
    PermissionDenied(ChannelId),

    #[error("event source fetch failed: {0}")]
    Fetch(String),
}

/// The chat platform's history API.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Channels of `community` whose history the bot is confirmed to be able to read.
    async fn readable_channels(&self, community: CommunityId) -> Result<Vec<ChannelId>, SourceError>;

    /// Fetch one page of `channel` history strictly after `cursor`, oldest first.
    async fn history_page(
        &self,
        channel: ChannelId,
        cursor: HistoryCursor,
    ) -> Result<HistoryPage, SourceError>;
}

/// Member listing and enforcement for a community.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn members(&self, community: CommunityId) -> Result<Vec<MemberInfo>, SourceError>;

    async fn kick(&self, community: CommunityId, member: MemberId, reason: &str) -> Result<(), SourceError>;
}
