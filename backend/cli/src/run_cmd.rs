//! `lastseen run`: connect to Discord and serve until interrupted.

use anyhow::{Context, Result};
use lastseen_channels::{DiscordAdapter, DiscordConfig};
use lastseen_logging::redact_token;
use lastseen_store::{AllowlistStore, StoreHandle};
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;

pub async fn run(config: Config) -> Result<()> {
    let token = config.bot_token()?.to_string();
    info!(
        db = %config.db_path.display(),
        whitelists = %config.whitelist_dir.display(),
        backfill_days = config.backfill_days,
        resync_secs = config.resync_secs,
        "Starting lastseen"
    );

    let store = StoreHandle::open(&config.db_path, config.queue_depth)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let allowlist = AllowlistStore::new(&config.whitelist_dir);

    let adapter = DiscordAdapter::new(
        DiscordConfig {
            token,
            command_prefix: config.command_prefix.clone(),
            sync: config.sync_settings(),
            resync_every: config.resync_every(),
        },
        store.clone(),
        allowlist,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = stop_tx.send(true);
        }
    });

    let result = adapter.start(stop_rx).await;
    if let Err(e) = &result {
        error!(error = %redact_token(&format!("{e:#}")), "Discord adapter stopped");
    }

    store.close().await?;
    info!("Store closed");
    result
}
