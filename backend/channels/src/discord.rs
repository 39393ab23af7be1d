use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use lastseen_commands::{
    build_dispatcher, detect_command, ActivityQueries, CommandContext, CommandDispatcher,
    CommandServices,
};
use lastseen_core::{CommunityId, MemberId};
use lastseen_store::{AllowlistStore, StoreHandle};
use lastseen_sync::{resync_loop, Backfiller, LiveRecorder, ReadinessTracker, SyncSettings};
use serenity::all::{
    Client, Context, EventHandler, GatewayIntents, Guild, GuildId, Interaction, Member, Message,
    Ready, UnavailableGuild, User,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::discord_slash;
use crate::discord_source::{activity_event, DiscordSource};

pub struct DiscordConfig {
    pub token: String,
    pub command_prefix: String,
    pub sync: SyncSettings,
    pub resync_every: Duration,
}

/// Parts that need the gateway's HTTP client and cache, built on first `ready`.
struct Connected {
    backfiller: Arc<Backfiller>,
    dispatcher: CommandDispatcher,
}

struct Handler {
    store: StoreHandle,
    allowlist: AllowlistStore,
    readiness: Arc<ReadinessTracker>,
    live: LiveRecorder,
    command_prefix: String,
    sync: SyncSettings,
    resync_every: Duration,
    connected: OnceLock<Connected>,
    resync_started: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl Handler {
    fn connected(&self, ctx: &Context) -> &Connected {
        self.connected.get_or_init(|| {
            let source = Arc::new(DiscordSource::new(ctx.http.clone(), ctx.cache.clone()));
            let services = CommandServices {
                queries: ActivityQueries::new(self.store.clone(), self.readiness.clone()),
                allowlist: self.allowlist.clone(),
                directory: source.clone(),
            };
            Connected {
                backfiller: Arc::new(Backfiller::new(source, self.store.clone(), self.sync)),
                dispatcher: build_dispatcher(services),
            }
        })
    }

    async fn backfill(&self, ctx: &Context, communities: Vec<CommunityId>) {
        if communities.is_empty() {
            return;
        }
        let connected = self.connected(ctx);
        let outcomes = connected.backfiller.run_batch(&self.readiness, communities).await;
        for (community, outcome) in outcomes {
            if !outcome.is_completed() {
                warn!(%community, "Community stays unready until the next resync");
            }
        }
    }

    fn start_resync(&self, ctx: &Context) {
        if self.resync_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = ctx.cache.clone();
        tokio::spawn(resync_loop(
            self.connected(ctx).backfiller.clone(),
            self.readiness.clone(),
            self.resync_every,
            move || cache.guilds().into_iter().map(|g| CommunityId(g.get())).collect(),
            self.shutdown.clone(),
        ));
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Connected to Discord");
        let connected = self.connected(&ctx);
        if let Err(e) = discord_slash::register_commands(&ctx, connected.dispatcher.registry()).await {
            error!(error = %e, "Slash command registration failed");
        }
    }

    /// Every guild from the initial handshake is cached: backfill them all in one batch.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        info!(guilds = guilds.len(), "Guild cache ready, starting backfill");
        self.start_resync(&ctx);
        let communities = guilds.into_iter().map(|g| CommunityId(g.get())).collect();
        self.backfill(&ctx, communities).await;
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new != Some(true) {
            return;
        }
        info!(community = %guild.id, name = %guild.name, "Joined guild");
        self.backfill(&ctx, vec![CommunityId(guild.id.get())]).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Unavailable means an outage, not a removal.
        if incomplete.unavailable {
            return;
        }
        info!(community = %incomplete.id, "Left guild");
        self.readiness.forget(CommunityId(incomplete.id.get()));
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        let community = CommunityId(guild_id.get());
        match self.store.delete_member(community, MemberId(user.id.get())).await {
            Ok(true) => info!(%community, member = %user.id, "Departed member's activity removed"),
            Ok(false) => {}
            Err(e) => error!(%community, member = %user.id, error = %e, "Could not remove departed member"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let invocation = match msg.guild_id {
            Some(_) if !msg.author.bot => detect_command(
                &msg.content,
                &self.command_prefix,
                self.connected(&ctx).dispatcher.registry(),
            ),
            _ => None,
        };

        if let Err(e) = self.live.record(&activity_event(&msg)).await {
            error!(error = %e, "Could not record live activity");
        }

        let (Some(invocation), Some(guild_id)) = (invocation, msg.guild_id) else {
            return;
        };
        let is_admin = msg
            .author_permissions(&ctx.cache)
            .is_some_and(|p| p.administrator());
        let context = CommandContext {
            community: CommunityId(guild_id.get()),
            invoker: MemberId(msg.author.id.get()),
            is_admin,
        };
        let response = self.connected(&ctx).dispatcher.dispatch(&context, &invocation).await;
        for chunk in response.chunks() {
            if let Err(e) = msg.channel_id.say(&ctx.http, chunk).await {
                error!(error = %e, "Could not send command reply");
                break;
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        let dispatcher = &self.connected(&ctx).dispatcher;
        if let Err(e) = discord_slash::handle_command(&ctx, &command, dispatcher).await {
            error!(command = %command.data.name, error = %e, "Slash command reply failed");
        }
    }
}

pub struct DiscordAdapter {
    config: DiscordConfig,
    store: StoreHandle,
    allowlist: AllowlistStore,
}

impl DiscordAdapter {
    pub fn new(config: DiscordConfig, store: StoreHandle, allowlist: AllowlistStore) -> Self {
        Self { config, store, allowlist }
    }

    /// Connect and serve until `shutdown` flips to `true`.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting Discord adapter");

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler {
            live: LiveRecorder::new(self.store.clone()),
            store: self.store,
            allowlist: self.allowlist,
            readiness: Arc::new(ReadinessTracker::new()),
            command_prefix: self.config.command_prefix,
            sync: self.config.sync,
            resync_every: self.config.resync_every,
            connected: OnceLock::new(),
            resync_started: AtomicBool::new(false),
            shutdown: shutdown.clone(),
        };

        let mut client = Client::builder(&self.config.token, intents)
            .event_handler(handler)
            .await?;
        let shard_manager = client.shard_manager.clone();

        tokio::select! {
            result = client.start() => {
                if let Err(why) = result {
                    error!(error = %why, "Discord client error");
                    anyhow::bail!("Discord client error: {why}");
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("Disconnecting from Discord");
                shard_manager.shutdown_all().await;
            }
        }
        Ok(())
    }
}
