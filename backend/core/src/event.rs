use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommunityId, MemberId};

/// A message-created event, live or from channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Platform event id. Ordered the same way as `at`.
    pub event_id: u64,
    /// `None` for events outside any community (direct messages).
    pub community: Option<CommunityId>,
    pub member: MemberId,
    pub display_name: String,
    /// Sent by a bot or webhook.
    pub automated: bool,
    pub at: DateTime<Utc>,
}

/// Exclusive lower bound for a channel history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Events strictly after this instant.
    Since(DateTime<Utc>),
    /// Events strictly after this event id.
    After(u64),
}

/// One page of channel history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub events: Vec<ActivityEvent>,
    /// Where the next page starts. `None` once the history is exhausted.
    pub next: Option<HistoryCursor>,
}

impl HistoryPage {
    pub fn last(events: Vec<ActivityEvent>) -> Self {
        Self { events, next: None }
    }
}
