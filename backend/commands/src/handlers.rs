/// Command handlers.
///
/// Each handler is a small struct implementing [`CommandHandler`] over the
/// shared [`CommandServices`].
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lastseen_core::{MemberDirectory, MemberId, MemberInfo};
use lastseen_store::AllowlistStore;
use tracing::{info, warn};

use crate::dispatch::CommandHandler;
use crate::error::CommandError;
use crate::lookup::{parse_days, parse_member_id, resolve_member};
use crate::queries::ActivityQueries;
use crate::report::find_inactive;
use crate::types::{CommandContext, CommandInvocation, CommandResponse};

/// Everything the handlers read from or act on.
#[derive(Clone)]
pub struct CommandServices {
    pub queries: ActivityQueries,
    pub allowlist: AllowlistStore,
    pub directory: Arc<dyn MemberDirectory>,
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn names(members: &[MemberInfo]) -> String {
    members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join("\n")
}

fn required_member<'a>(inv: &'a CommandInvocation) -> Result<&'a str, CommandError> {
    inv.arg(0)
        .ok_or_else(|| CommandError::bad_argument(format!("/{} needs a member", inv.key)))
}

fn not_a_member(raw: &str) -> CommandError {
    CommandError::bad_argument(format!(
        "User {raw} does not exist or is not a member of this server"
    ))
}

// ---------------------------------------------------------------------------
// /inactive
// ---------------------------------------------------------------------------

pub struct InactiveHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for InactiveHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let days = parse_days(inv.arg(0))?;
        let activity = self.services.queries.all_last_active(ctx.community).await?;
        let members = self.services.directory.members(ctx.community).await?;
        let allowlist = self.services.allowlist.load(ctx.community).await?;

        let report = find_inactive(&members, &activity, &allowlist, days, Utc::now());
        let mut text = if report.inactive.is_empty() {
            format!("No inactive members found in the last {days} days.")
        } else {
            format!(
                "**{} inactive members in the last {days} days:**\n{}",
                report.inactive.len(),
                names(&report.inactive)
            )
        };
        if !report.allowlisted.is_empty() {
            text.push_str(&format!(
                "\n\n**{} whitelisted inactive members:**\n{}",
                report.allowlisted.len(),
                names(&report.allowlisted)
            ));
        }
        Ok(CommandResponse::ephemeral(text))
    }
}

// ---------------------------------------------------------------------------
// /kick_inactive
// ---------------------------------------------------------------------------

pub struct KickInactiveHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for KickInactiveHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let days = parse_days(inv.arg(0))?;
        let community = ctx.community;
        let activity = self.services.queries.all_last_active(community).await?;
        let members = self.services.directory.members(community).await?;
        let allowlist = self.services.allowlist.load(community).await?;
        let report = find_inactive(&members, &activity, &allowlist, days, Utc::now());

        let reason = format!("Inactive for {days} days");
        let mut kicked = Vec::new();
        let mut failed = Vec::new();
        for member in report.inactive {
            match self.services.directory.kick(community, member.id, &reason).await {
                Ok(()) => {
                    info!(%community, member = %member.id, days, "Kicked inactive member");
                    if let Err(e) = self.services.queries.forget_member(community, member.id).await {
                        warn!(%community, member = %member.id, error = %e, "Kicked member's record not deleted");
                    }
                    kicked.push(member);
                }
                Err(e) => {
                    warn!(%community, member = %member.id, error = %e, "Kick failed");
                    failed.push(member);
                }
            }
        }

        let mut sections = Vec::new();
        if kicked.is_empty() && failed.is_empty() {
            sections.push(format!("No inactive members found in the last {days} days."));
        }
        if !kicked.is_empty() {
            sections.push(format!(
                "**Kicked {} members which were inactive in the last {days} days:**\n{}",
                kicked.len(),
                names(&kicked)
            ));
        }
        if !failed.is_empty() {
            sections.push(format!("**Could not kick {} members:**\n{}", failed.len(), names(&failed)));
        }
        if !report.allowlisted.is_empty() {
            sections.push(format!(
                "**Did not kick {} whitelisted inactive members:**\n{}",
                report.allowlisted.len(),
                names(&report.allowlisted)
            ));
        }
        Ok(CommandResponse::public(sections.join("\n\n")))
    }
}

// ---------------------------------------------------------------------------
// /lastseen
// ---------------------------------------------------------------------------

pub struct LastSeenHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for LastSeenHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let raw = required_member(inv)?;
        if !self.services.queries.is_ready(ctx.community) {
            return Err(CommandError::StillSyncing(ctx.community));
        }
        let members = self.services.directory.members(ctx.community).await?;
        let (id, name) = match resolve_member(&members, raw) {
            Some(member) => (member.id, member.name.clone()),
            // Former members keep their record; allow lookups by id.
            None => {
                let id = parse_member_id(raw).ok_or_else(|| not_a_member(raw))?;
                (id, id.to_string())
            }
        };

        let text = match self.services.queries.last_active(ctx.community, id).await? {
            Some(at) => format!("**{name}** was last active {}.", format_time(at)),
            None => format!("No recorded activity for **{name}**."),
        };
        Ok(CommandResponse::ephemeral(text))
    }
}

// ---------------------------------------------------------------------------
// /sync_status
// ---------------------------------------------------------------------------

pub struct SyncStatusHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for SyncStatusHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        _inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let queries = &self.services.queries;
        let tracked = queries.tracked_members(ctx.community).await?;
        let text = if queries.is_ready(ctx.community) {
            format!("Message history is fully synced. Tracking activity for {tracked} members.")
        } else {
            let resume = match queries.checkpoint(ctx.community).await? {
                Some(cp) if !cp.completed => format!(" Resuming from {}.", format_time(cp.boundary)),
                _ => String::new(),
            };
            format!(
                "Still syncing message history.{resume} Activity recorded so far for {tracked} members."
            )
        };
        Ok(CommandResponse::ephemeral(text))
    }
}

// ---------------------------------------------------------------------------
// /whitelist_show, /whitelist_add, /whitelist_remove
// ---------------------------------------------------------------------------

fn describe_allowlist(allowlist: &BTreeSet<MemberId>, members: &[MemberInfo]) -> String {
    allowlist
        .iter()
        .map(|id| match members.iter().find(|m| m.id == *id) {
            Some(member) => format!("{} ({id})", member.name),
            None => id.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn allowlist_listing(allowlist: &BTreeSet<MemberId>, members: &[MemberInfo]) -> String {
    if allowlist.is_empty() {
        "The whitelist is now empty.".to_string()
    } else {
        format!(
            "The whitelist currently contains the following users:\n{}",
            describe_allowlist(allowlist, members)
        )
    }
}

pub struct WhitelistShowHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for WhitelistShowHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        _inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let allowlist = self.services.allowlist.load(ctx.community).await?;
        if allowlist.is_empty() {
            return Ok(CommandResponse::ephemeral("**No members currently on the whitelist**"));
        }
        let members = self.services.directory.members(ctx.community).await?;
        Ok(CommandResponse::ephemeral(format!(
            "**Whitelisted members (will not be kicked out even when inactive):**\n{}",
            describe_allowlist(&allowlist, &members)
        )))
    }
}

pub struct WhitelistAddHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for WhitelistAddHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let raw = required_member(inv)?;
        let members = self.services.directory.members(ctx.community).await?;
        let member = resolve_member(&members, raw).ok_or_else(|| not_a_member(raw))?;

        let Some(allowlist) = self
            .services
            .allowlist
            .update(ctx.community, |set| set.insert(member.id))
            .await?
        else {
            return Err(CommandError::bad_argument(format!(
                "User {} is already on the whitelist",
                member.name
            )));
        };
        info!(community = %ctx.community, member = %member.id, "Member whitelisted");

        Ok(CommandResponse::ephemeral(format!(
            "**User {} was added to the whitelist**\n{}",
            member.name,
            allowlist_listing(&allowlist, &members)
        )))
    }
}

pub struct WhitelistRemoveHandler {
    pub services: CommandServices,
}

#[async_trait]
impl CommandHandler for WhitelistRemoveHandler {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let raw = required_member(inv)?;
        let members = self.services.directory.members(ctx.community).await?;
        let (id, name) = match resolve_member(&members, raw) {
            Some(member) => (member.id, member.name.clone()),
            None => {
                let id = parse_member_id(raw).ok_or_else(|| not_a_member(raw))?;
                (id, id.to_string())
            }
        };

        let Some(allowlist) =
            self.services.allowlist.update(ctx.community, |set| set.remove(&id)).await?
        else {
            return Err(CommandError::bad_argument(format!(
                "User {name} is not currently on the whitelist"
            )));
        };
        info!(community = %ctx.community, member = %id, "Member removed from whitelist");

        Ok(CommandResponse::ephemeral(format!(
            "**User {name} was removed from the whitelist**\n{}",
            allowlist_listing(&allowlist, &members)
        )))
    }
}
