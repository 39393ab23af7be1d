//! Discord as the history source and member directory.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lastseen_core::{
    from_millis, to_millis, ActivityEvent, ChannelId, CommunityId, EventSource, HistoryCursor,
    HistoryPage, MemberDirectory, MemberId, MemberInfo, SourceError,
};
use serenity::all::{
    Cache, ChannelType, GetMessages, GuildId, Http, Message, MessageId, UserId,
};
use tracing::debug;

/// Milliseconds between the Unix epoch and the first second of 2015.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Discord's maximum page size for channel history.
const HISTORY_PAGE_SIZE: u8 = 100;
/// Discord's maximum page size for guild member listing.
const MEMBER_PAGE_SIZE: u64 = 1000;

/// Creation time encoded in a snowflake id.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    from_millis((id >> 22) as i64 + DISCORD_EPOCH_MS)
}

/// Largest snowflake created at or before `at`; "after" this id means
/// "strictly after `at`".
pub fn snowflake_before_next_ms(at: DateTime<Utc>) -> u64 {
    let since_epoch = to_millis(at) + 1 - DISCORD_EPOCH_MS;
    if since_epoch <= 0 {
        return 1;
    }
    ((since_epoch as u64) << 22).saturating_sub(1).max(1)
}

pub fn activity_event(msg: &Message) -> ActivityEvent {
    ActivityEvent {
        event_id: msg.id.get(),
        community: msg.guild_id.map(|g| CommunityId(g.get())),
        member: MemberId(msg.author.id.get()),
        display_name: msg.author.name.clone(),
        automated: msg.author.bot || msg.webhook_id.is_some(),
        at: snowflake_time(msg.id.get()),
    }
}

fn fetch_error(channel: Option<ChannelId>, e: serenity::Error) -> SourceError {
    if let (Some(channel), serenity::Error::Http(http)) = (channel, &e) {
        if http.status_code().map(|s| s.as_u16()) == Some(403) {
            return SourceError::PermissionDenied(channel);
        }
    }
    SourceError::Fetch(e.to_string())
}

#[derive(Clone)]
pub struct DiscordSource {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordSource {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl EventSource for DiscordSource {
    async fn readable_channels(&self, community: CommunityId) -> Result<Vec<ChannelId>, SourceError> {
        let guild_id = GuildId::new(community.get());
        let me = self.cache.current_user().id;

        let Some(guild) = self.cache.guild(guild_id) else {
            return Err(SourceError::Fetch(format!("guild {community} is not cached")));
        };
        let Some(member) = guild.members.get(&me) else {
            return Err(SourceError::Fetch(format!("own member entry missing in guild {community}")));
        };

        let mut readable: Vec<ChannelId> = guild
            .channels
            .values()
            .filter(|c| matches!(c.kind, ChannelType::Text | ChannelType::News))
            .filter(|c| {
                let perms = guild.user_permissions_in(c, member);
                perms.view_channel() && perms.read_message_history()
            })
            .map(|c| ChannelId(c.id.get()))
            .collect();
        readable.sort();
        debug!(%community, channels = readable.len(), "Readable channels resolved");
        Ok(readable)
    }

    async fn history_page(
        &self,
        channel: ChannelId,
        cursor: HistoryCursor,
    ) -> Result<HistoryPage, SourceError> {
        let after = match cursor {
            HistoryCursor::Since(at) => snowflake_before_next_ms(at),
            HistoryCursor::After(id) => id.max(1),
        };
        let builder = GetMessages::new().after(MessageId::new(after)).limit(HISTORY_PAGE_SIZE);
        let mut messages = serenity::all::ChannelId::new(channel.get())
            .messages(&self.http, builder)
            .await
            .map_err(|e| fetch_error(Some(channel), e))?;

        // Discord does not promise an order for `after` queries.
        messages.sort_by_key(|m| m.id);
        let full_page = messages.len() == usize::from(HISTORY_PAGE_SIZE);
        let events: Vec<ActivityEvent> = messages.iter().map(activity_event).collect();
        let next = match events.last() {
            Some(last) if full_page => Some(HistoryCursor::After(last.event_id)),
            _ => None,
        };
        Ok(HistoryPage { events, next })
    }
}

#[async_trait]
impl MemberDirectory for DiscordSource {
    async fn members(&self, community: CommunityId) -> Result<Vec<MemberInfo>, SourceError> {
        let guild_id = GuildId::new(community.get());
        let mut all = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = guild_id
                .members(&self.http, Some(MEMBER_PAGE_SIZE), after)
                .await
                .map_err(|e| fetch_error(None, e))?;
            let done = (page.len() as u64) < MEMBER_PAGE_SIZE;
            after = page.last().map(|m| m.user.id);
            all.extend(page.into_iter().map(|m| MemberInfo {
                id: MemberId(m.user.id.get()),
                name: m.user.name.clone(),
                automated: m.user.bot,
            }));
            if done || after.is_none() {
                break;
            }
        }
        Ok(all)
    }

    async fn kick(
        &self,
        community: CommunityId,
        member: MemberId,
        reason: &str,
    ) -> Result<(), SourceError> {
        GuildId::new(community.get())
            .kick_with_reason(&self.http, UserId::new(member.get()), reason)
            .await
            .map_err(|e| fetch_error(None, e))
    }
}
