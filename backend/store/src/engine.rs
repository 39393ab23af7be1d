/// SQLite-backed activity store.
///
/// Holds the last observed activity per (community, member) and one sync
/// checkpoint per community. Every write is a single guarded statement inside
/// its own transaction, so "newest wins" is enforced by the database rather
/// than by a read-then-write in the caller.
use std::path::Path;

use chrono::{DateTime, Utc};
use lastseen_core::{from_millis, to_millis, CommunityId, MemberId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS activity (
        community_id    INTEGER NOT NULL,
        member_id       INTEGER NOT NULL,
        display_name    TEXT NOT NULL,
        last_active_ms  INTEGER NOT NULL,
        PRIMARY KEY (community_id, member_id)
    );
    CREATE INDEX IF NOT EXISTS idx_activity_latest
        ON activity(community_id, last_active_ms);

    CREATE TABLE IF NOT EXISTS sync_checkpoint (
        community_id    INTEGER PRIMARY KEY NOT NULL,
        boundary_ms     INTEGER NOT NULL,
        completed       INTEGER NOT NULL
    );";

/// Last observed activity of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub community: CommunityId,
    pub member: MemberId,
    pub display_name: String,
    pub last_active: DateTime<Utc>,
}

/// How far a community's history backfill is known to have progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncCheckpoint {
    pub community: CommunityId,
    pub boundary: DateTime<Utc>,
    pub completed: bool,
}

pub struct ActivityDb {
    conn: Connection,
}

impl ActivityDb {
    /// Open or create the activity database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self { conn };
        db.init_schema()?;
        info!(path = %path.as_ref().display(), "Activity store opened");
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Record activity. Returns `true` if the row was inserted or moved forward;
    /// a timestamp that is not strictly newer than the stored one changes nothing,
    /// including the display name.
    pub fn upsert_activity(
        &mut self,
        community: CommunityId,
        member: MemberId,
        display_name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO activity (community_id, member_id, display_name, last_active_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(community_id, member_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 last_active_ms = excluded.last_active_ms
             WHERE excluded.last_active_ms > activity.last_active_ms",
            params![sql_id(community.get()), sql_id(member.get()), display_name, to_millis(at)],
        )?;
        tx.commit()?;
        debug!(%community, %member, applied = changed > 0, "upsert activity");
        Ok(changed > 0)
    }

    /// Open the checkpoint for a new backfill pass at `boundary`.
    ///
    /// A completed checkpoint is always re-opened. An open one only moves when
    /// `boundary` is strictly newer than what is stored.
    pub fn begin_checkpoint(
        &mut self,
        community: CommunityId,
        boundary: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO sync_checkpoint (community_id, boundary_ms, completed)
             VALUES (?1, ?2, 0)
             ON CONFLICT(community_id) DO UPDATE SET
                 boundary_ms = excluded.boundary_ms,
                 completed = 0
             WHERE sync_checkpoint.completed = 1
                OR excluded.boundary_ms > sync_checkpoint.boundary_ms",
            params![sql_id(community.get()), to_millis(boundary)],
        )?;
        tx.commit()?;
        debug!(%community, %boundary, applied = changed > 0, "begin checkpoint");
        Ok(changed > 0)
    }

    /// Mark the community's backfill complete as of `now`.
    pub fn finalize_checkpoint(
        &mut self,
        community: CommunityId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sync_checkpoint (community_id, boundary_ms, completed)
             VALUES (?1, ?2, 1)
             ON CONFLICT(community_id) DO UPDATE SET
                 boundary_ms = excluded.boundary_ms,
                 completed = 1",
            params![sql_id(community.get()), to_millis(now)],
        )?;
        tx.commit()?;
        debug!(%community, "finalize checkpoint");
        Ok(())
    }

    pub fn read_last_active(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let millis: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_active_ms FROM activity
                 WHERE community_id = ?1 AND member_id = ?2",
                params![sql_id(community.get()), sql_id(member.get())],
                |row| row.get(0),
            )
            .optional()?;
        Ok(millis.map(from_millis))
    }

    pub fn read_all_last_active(
        &self,
        community: CommunityId,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT member_id, display_name, last_active_ms FROM activity
             WHERE community_id = ?1 ORDER BY member_id",
        )?;
        let records = stmt
            .query_map(params![sql_id(community.get())], |row| {
                Ok(ActivityRecord {
                    community,
                    member: MemberId(row.get::<_, i64>(0)? as u64),
                    display_name: row.get(1)?,
                    last_active: from_millis(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Where the next backfill should resume from.
    ///
    /// An open checkpoint wins: its boundary is at or before anything the
    /// interrupted pass recorded. Otherwise the newest recorded activity is used.
    pub fn read_sync_boundary(
        &mut self,
        community: CommunityId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let tx = self.conn.transaction()?;
        let checkpoint: Option<(i64, bool)> = tx
            .query_row(
                "SELECT boundary_ms, completed FROM sync_checkpoint WHERE community_id = ?1",
                params![sql_id(community.get())],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((boundary_ms, false)) = checkpoint {
            debug!(%community, "previous backfill unfinished, resuming from checkpoint");
            return Ok(Some(from_millis(boundary_ms)));
        }

        let latest: Option<i64> = tx.query_row(
            "SELECT MAX(last_active_ms) FROM activity WHERE community_id = ?1",
            params![sql_id(community.get())],
            |row| row.get(0),
        )?;
        Ok(latest.map(from_millis))
    }

    pub fn read_checkpoint(
        &self,
        community: CommunityId,
    ) -> Result<Option<SyncCheckpoint>, StoreError> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT boundary_ms, completed FROM sync_checkpoint WHERE community_id = ?1",
                params![sql_id(community.get())],
                |row| {
                    Ok(SyncCheckpoint {
                        community,
                        boundary: from_millis(row.get(0)?),
                        completed: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    pub fn count_activity(&self, community: CommunityId) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activity WHERE community_id = ?1",
            params![sql_id(community.get())],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Forget a member who left the community. Returns whether a row existed.
    pub fn delete_member(
        &mut self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM activity WHERE community_id = ?1 AND member_id = ?2",
            params![sql_id(community.get()), sql_id(member.get())],
        )?;
        tx.commit()?;
        debug!(%community, %member, removed, "delete member");
        Ok(removed > 0)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

// Snowflake ids stay below 2^63, so they fit SQLite's signed INTEGER.
fn sql_id(id: u64) -> i64 {
    id as i64
}
