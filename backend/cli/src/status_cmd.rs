//! `lastseen status`: persisted sync state of one community.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lastseen_core::CommunityId;
use lastseen_store::{StoreHandle, SyncCheckpoint};

use crate::config::Config;

pub struct StatusReport {
    pub community: CommunityId,
    pub checkpoint: Option<SyncCheckpoint>,
    pub resume_boundary: Option<DateTime<Utc>>,
    pub records: u64,
}

impl StatusReport {
    pub async fn load(store: &StoreHandle, community: CommunityId) -> Result<Self> {
        Ok(Self {
            community,
            checkpoint: store.read_checkpoint(community).await?,
            resume_boundary: store.read_sync_boundary(community).await?,
            records: store.count_activity(community).await?,
        })
    }

    pub fn render(&self) -> String {
        let checkpoint = match &self.checkpoint {
            None => "none".to_string(),
            Some(cp) if cp.completed => format!("{} (completed)", cp.boundary.to_rfc3339()),
            Some(cp) => format!("{} (open, backfill interrupted)", cp.boundary.to_rfc3339()),
        };
        let boundary = self
            .resume_boundary
            .map(|b| b.to_rfc3339())
            .unwrap_or_else(|| "none (next backfill uses the full window)".to_string());
        format!(
            "Guild {}\n  checkpoint:       {checkpoint}\n  resume boundary:  {boundary}\n  activity records: {}",
            self.community, self.records
        )
    }
}

pub async fn run(config: &Config, guild: u64) -> Result<()> {
    if !config.db_path.exists() {
        anyhow::bail!("no database at {}", config.db_path.display());
    }
    let store = StoreHandle::open(&config.db_path, config.queue_depth)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let report = StatusReport::load(&store, CommunityId(guild)).await?;
    store.close().await?;

    println!("{}", report.render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lastseen_core::MemberId;

    #[tokio::test]
    async fn reports_open_checkpoint() {
        let store = StoreHandle::in_memory().unwrap();
        let g = CommunityId(7);
        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        store.begin_checkpoint(g, boundary).await.unwrap();
        store
            .upsert_activity(g, MemberId(1), "alice", Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
            .await
            .unwrap();

        let report = StatusReport::load(&store, g).await.unwrap();
        let text = report.render();
        assert!(text.contains("2024-03-01T00:00:00+00:00 (open, backfill interrupted)"), "{text}");
        assert!(text.contains("resume boundary:  2024-03-01T00:00:00+00:00"));
        assert!(text.ends_with("activity records: 1"));
    }

    #[tokio::test]
    async fn reports_unknown_guild() {
        let store = StoreHandle::in_memory().unwrap();
        let text = StatusReport::load(&store, CommunityId(9)).await.unwrap().render();
        assert!(text.contains("checkpoint:       none"));
        assert!(text.contains("activity records: 0"));
    }
}
