/// Command dispatch: permission check, handler lookup, error rendering.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::CommandError;
use crate::registry::CommandRegistry;
use crate::types::{CommandContext, CommandInvocation, CommandResponse};

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError>;
}

pub struct CommandDispatcher {
    registry: CommandRegistry,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry, handlers: HashMap::new() }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(key.into(), handler);
    }

    /// Run a command and turn any failure into a reply for the invoker.
    pub async fn dispatch(&self, ctx: &CommandContext, inv: &CommandInvocation) -> CommandResponse {
        match self.try_dispatch(ctx, inv).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    CommandError::StillSyncing(_) => {
                        debug!(community = %ctx.community, command = %inv.key, "Command refused, still syncing")
                    }
                    CommandError::NotPermitted(_) | CommandError::BadArgument(_) => {
                        debug!(community = %ctx.community, command = %inv.key, error = %e, "Command rejected")
                    }
                    CommandError::Storage(_) | CommandError::Directory(_) => {
                        error!(community = %ctx.community, command = %inv.key, error = %e, "Command failed")
                    }
                }
                CommandResponse::ephemeral(e.user_message())
            }
        }
    }

    pub async fn try_dispatch(
        &self,
        ctx: &CommandContext,
        inv: &CommandInvocation,
    ) -> Result<CommandResponse, CommandError> {
        let def = self
            .registry
            .find(&inv.key)
            .ok_or_else(|| CommandError::bad_argument(format!("Unknown command /{}", inv.key)))?;
        if def.admin_only && !ctx.is_admin {
            return Err(CommandError::NotPermitted(def.key.clone()));
        }
        let handler = self
            .handlers
            .get(&def.key)
            .ok_or_else(|| CommandError::bad_argument(format!("No handler registered for /{}", def.key)))?;

        info!(
            community = %ctx.community,
            invoker = %ctx.invoker,
            command = %def.key,
            args = ?inv.args,
            "Command received"
        );
        handler.handle(ctx, inv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::CommandServices;
    use crate::queries::ActivityQueries;
    use crate::build_dispatcher;
    use chrono::{Duration, Utc};
    use lastseen_core::{
        CommunityId, MemberDirectory, MemberId, MemberInfo, SourceError,
    };
    use lastseen_store::{AllowlistStore, StoreHandle};
    use lastseen_sync::ReadinessTracker;
    use std::sync::Mutex;

    const G1: CommunityId = CommunityId(1);

    #[derive(Default)]
    struct FakeDirectory {
        members: Mutex<Vec<MemberInfo>>,
        unkickable: Vec<MemberId>,
        kicked: Mutex<Vec<(MemberId, String)>>,
    }

    #[async_trait]
    impl MemberDirectory for FakeDirectory {
        async fn members(&self, _: CommunityId) -> Result<Vec<MemberInfo>, SourceError> {
            Ok(self.members.lock().unwrap().clone())
        }

        async fn kick(&self, _: CommunityId, member: MemberId, reason: &str) -> Result<(), SourceError> {
            if self.unkickable.contains(&member) {
                return Err(SourceError::Fetch("403 Missing Permissions".into()));
            }
            self.members.lock().unwrap().retain(|m| m.id != member);
            self.kicked.lock().unwrap().push((member, reason.to_string()));
            Ok(())
        }
    }

    fn member(id: u64, name: &str) -> MemberInfo {
        MemberInfo { id: MemberId(id), name: name.into(), automated: false }
    }

    struct Harness {
        dispatcher: CommandDispatcher,
        store: StoreHandle,
        readiness: Arc<ReadinessTracker>,
        directory: Arc<FakeDirectory>,
        dir: tempfile::TempDir,
    }

    async fn harness(directory: FakeDirectory) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreHandle::in_memory().unwrap();
        let readiness = Arc::new(ReadinessTracker::new());
        let directory = Arc::new(directory);
        let services = CommandServices {
            queries: ActivityQueries::new(store.clone(), readiness.clone()),
            allowlist: AllowlistStore::new(dir.path()),
            directory: directory.clone(),
        };
        readiness.mark_pending([G1]).await.mark_ready(G1);
        Harness { dispatcher: build_dispatcher(services), store, readiness, directory, dir }
    }

    fn admin() -> CommandContext {
        CommandContext { community: G1, invoker: MemberId(1), is_admin: true }
    }

    fn user() -> CommandContext {
        CommandContext { is_admin: false, ..admin() }
    }

    fn inv(key: &str, args: &[&str]) -> CommandInvocation {
        CommandInvocation::new(key, args.iter().map(|a| a.to_string()).collect())
    }

    fn directory_of(members: Vec<MemberInfo>) -> FakeDirectory {
        FakeDirectory { members: Mutex::new(members), ..Default::default() }
    }

    #[tokio::test]
    async fn inactive_lists_stale_and_whitelisted_members() {
        let h = harness(directory_of(vec![member(10, "alice"), member(11, "bob"), member(12, "carol")])).await;
        h.store.upsert_activity(G1, MemberId(10), "alice", Utc::now() - Duration::days(2)).await.unwrap();
        h.store.upsert_activity(G1, MemberId(11), "bob", Utc::now() - Duration::days(50)).await.unwrap();
        h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &["carol"])).await;

        let reply = h.dispatcher.dispatch(&user(), &inv("inactive", &[])).await;
        assert!(reply.ephemeral);
        assert_eq!(
            reply.text,
            "**1 inactive members in the last 30 days:**\nbob\n\n**1 whitelisted inactive members:**\ncarol"
        );

        let reply = h.dispatcher.dispatch(&user(), &inv("inactive", &["60"])).await;
        assert!(reply.text.starts_with("No inactive members found in the last 60 days."));
    }

    #[tokio::test]
    async fn gated_commands_refuse_while_syncing() {
        let h = harness(directory_of(vec![member(10, "alice")])).await;
        let _batch = h.readiness.mark_pending([G1]).await;

        for (key, args) in [("inactive", vec![]), ("kick_inactive", vec![]), ("lastseen", vec!["alice"])] {
            let result = h.dispatcher.try_dispatch(&admin(), &inv(key, &args)).await;
            assert!(matches!(result, Err(CommandError::StillSyncing(G1))), "{key}");
        }
        assert!(h.directory.kicked.lock().unwrap().is_empty());

        let reply = h.dispatcher.dispatch(&user(), &inv("sync_status", &[])).await;
        assert!(reply.text.starts_with("Still syncing"), "{}", reply.text);
    }

    #[tokio::test]
    async fn kick_inactive_kicks_deletes_and_reports() {
        let mut directory = directory_of(vec![
            member(10, "active"),
            member(11, "stale"),
            member(12, "sturdy"),
            member(13, "kept"),
        ]);
        directory.unkickable.push(MemberId(12));
        let h = harness(directory).await;
        h.store.upsert_activity(G1, MemberId(10), "active", Utc::now()).await.unwrap();
        h.store.upsert_activity(G1, MemberId(11), "stale", Utc::now() - Duration::days(90)).await.unwrap();
        h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &["<@13>"])).await;

        let denied = h.dispatcher.dispatch(&user(), &inv("kick_inactive", &[])).await;
        assert!(denied.text.contains("administrator"));
        assert!(h.directory.kicked.lock().unwrap().is_empty());

        let reply = h.dispatcher.dispatch(&admin(), &inv("kick_inactive", &["30"])).await;
        assert!(!reply.ephemeral);
        assert_eq!(
            reply.text,
            "**Kicked 1 members which were inactive in the last 30 days:**\nstale\n\n\
             **Could not kick 1 members:**\nsturdy\n\n\
             **Did not kick 1 whitelisted inactive members:**\nkept"
        );
        assert_eq!(
            *h.directory.kicked.lock().unwrap(),
            vec![(MemberId(11), "Inactive for 30 days".to_string())]
        );
        assert_eq!(h.store.read_last_active(G1, MemberId(11)).await.unwrap(), None);
        assert!(h.store.read_last_active(G1, MemberId(10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lastseen_reports_timestamp_or_absence() {
        let h = harness(directory_of(vec![member(10, "alice"), member(11, "bob")])).await;
        let at = Utc::now() - Duration::days(3);
        h.store.upsert_activity(G1, MemberId(10), "alice", at).await.unwrap();

        let reply = h.dispatcher.dispatch(&user(), &inv("lastseen", &["<@10>"])).await;
        assert_eq!(reply.text, format!("**alice** was last active {}.", at.format("%Y-%m-%d %H:%M UTC")));

        let reply = h.dispatcher.dispatch(&user(), &inv("lastseen", &["bob"])).await;
        assert_eq!(reply.text, "No recorded activity for **bob**.");

        let reply = h.dispatcher.dispatch(&user(), &inv("lastseen", &["nobody"])).await;
        assert!(reply.text.contains("is not a member"));

        let reply = h.dispatcher.dispatch(&user(), &inv("lastseen", &[])).await;
        assert!(reply.text.contains("needs a member"));
    }

    #[tokio::test]
    async fn whitelist_round_trip() {
        let h = harness(directory_of(vec![member(10, "alice"), member(11, "bob")])).await;

        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_show", &[])).await;
        assert_eq!(reply.text, "**No members currently on the whitelist**");

        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &["alice"])).await;
        assert!(reply.text.starts_with("**User alice was added to the whitelist**"));
        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &["10"])).await;
        assert_eq!(reply.text, "**User alice is already on the whitelist**");
        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &["mallory"])).await;
        assert!(reply.text.contains("does not exist"));

        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_show", &[])).await;
        assert!(reply.text.ends_with("alice (10)"), "{}", reply.text);

        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_remove", &["bob"])).await;
        assert_eq!(reply.text, "**User bob is not currently on the whitelist**");
        let reply = h.dispatcher.dispatch(&admin(), &inv("whitelist_remove", &["alice"])).await;
        assert_eq!(reply.text, "**User alice was removed from the whitelist**\nThe whitelist is now empty.");

        let reply = h.dispatcher.dispatch(&user(), &inv("whitelist_show", &[])).await;
        assert!(reply.text.contains("administrator"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_whitelist_adds_are_all_kept() {
        let members = (1..=20).map(|id| member(id, &format!("m{id}"))).collect();
        let h = Arc::new(harness(directory_of(members)).await);

        let mut tasks = Vec::new();
        for id in 1..=20_u64 {
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                let id = id.to_string();
                h.dispatcher.dispatch(&admin(), &inv("whitelist_add", &[id.as_str()])).await
            }));
        }
        for task in tasks {
            let reply = task.await.unwrap();
            assert!(reply.text.contains("was added to the whitelist"), "{}", reply.text);
        }

        let stored = AllowlistStore::new(h.dir.path()).load(G1).await.unwrap();
        assert_eq!(stored.len(), 20);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let h = harness(FakeDirectory::default()).await;
        let result = h.dispatcher.try_dispatch(&admin(), &inv("ban", &[])).await;
        assert!(matches!(result, Err(CommandError::BadArgument(_))));
    }
}
