/// Async front door to the activity store.
///
/// A single writer thread owns the [`ActivityDb`]. Each call on [`StoreHandle`]
/// enqueues one request carrying a private oneshot responder, then suspends the
/// calling task until that request has run. Requests execute one at a time in
/// the order they were enqueued; nothing is batched or reordered.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread;

use chrono::{DateTime, Utc};
use lastseen_core::{CommunityId, MemberId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{ActivityDb, ActivityRecord, SyncCheckpoint};
use crate::error::StoreError;

/// Default bound of the request queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

type Responder<T> = oneshot::Sender<Result<T, StoreError>>;

/// The closed set of operations the writer thread executes.
enum StoreRequest {
    UpsertActivity {
        community: CommunityId,
        member: MemberId,
        display_name: String,
        at: DateTime<Utc>,
        respond: Responder<bool>,
    },
    BeginCheckpoint {
        community: CommunityId,
        boundary: DateTime<Utc>,
        respond: Responder<bool>,
    },
    FinalizeCheckpoint {
        community: CommunityId,
        respond: Responder<()>,
    },
    ReadLastActive {
        community: CommunityId,
        member: MemberId,
        respond: Responder<Option<DateTime<Utc>>>,
    },
    ReadAllLastActive {
        community: CommunityId,
        respond: Responder<Vec<ActivityRecord>>,
    },
    ReadSyncBoundary {
        community: CommunityId,
        respond: Responder<Option<DateTime<Utc>>>,
    },
    ReadCheckpoint {
        community: CommunityId,
        respond: Responder<Option<SyncCheckpoint>>,
    },
    CountActivity {
        community: CommunityId,
        respond: Responder<u64>,
    },
    DeleteMember {
        community: CommunityId,
        member: MemberId,
        respond: Responder<bool>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
    #[cfg(test)]
    Panic {
        respond: Responder<()>,
    },
}

impl StoreRequest {
    fn name(&self) -> &'static str {
        match self {
            StoreRequest::UpsertActivity { .. } => "upsert_activity",
            StoreRequest::BeginCheckpoint { .. } => "begin_checkpoint",
            StoreRequest::FinalizeCheckpoint { .. } => "finalize_checkpoint",
            StoreRequest::ReadLastActive { .. } => "read_last_active",
            StoreRequest::ReadAllLastActive { .. } => "read_all_last_active",
            StoreRequest::ReadSyncBoundary { .. } => "read_sync_boundary",
            StoreRequest::ReadCheckpoint { .. } => "read_checkpoint",
            StoreRequest::CountActivity { .. } => "count_activity",
            StoreRequest::DeleteMember { .. } => "delete_member",
            StoreRequest::Shutdown { .. } => "shutdown",
            #[cfg(test)]
            StoreRequest::Panic { .. } => "panic",
        }
    }
}

/// Cloneable handle to the store's writer thread.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreRequest>,
}

impl StoreHandle {
    /// Open the database at `path` and start the writer thread.
    pub fn open(path: impl AsRef<Path>, queue_depth: usize) -> Result<Self, StoreError> {
        Self::spawn(ActivityDb::open(path)?, queue_depth)
    }

    /// Store backed by an in-memory database (for tests and dry runs).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::spawn(ActivityDb::in_memory()?, DEFAULT_QUEUE_DEPTH)
    }

    /// Hand `db` to a dedicated writer thread.
    pub fn spawn(db: ActivityDb, queue_depth: usize) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        thread::Builder::new()
            .name("lastseen-store".into())
            .spawn(move || worker_loop(db, rx))?;
        info!(queue_depth, "Store writer thread started");
        Ok(Self { tx })
    }

    async fn submit<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let (respond, response) = oneshot::channel();
        self.tx
            .send(build(respond))
            .await
            .map_err(|_| StoreError::WorkerUnavailable)?;
        response.await.map_err(|_| StoreError::WorkerUnavailable)?
    }

    /// Record activity; only applied when `at` is newer than what is stored.
    pub async fn upsert_activity(
        &self,
        community: CommunityId,
        member: MemberId,
        display_name: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let display_name = display_name.into();
        self.submit(|respond| StoreRequest::UpsertActivity {
            community,
            member,
            display_name,
            at,
            respond,
        })
        .await
    }

    pub async fn begin_checkpoint(
        &self,
        community: CommunityId,
        boundary: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.submit(|respond| StoreRequest::BeginCheckpoint { community, boundary, respond })
            .await
    }

    /// Mark the community's backfill complete as of the moment it runs.
    pub async fn finalize_checkpoint(&self, community: CommunityId) -> Result<(), StoreError> {
        self.submit(|respond| StoreRequest::FinalizeCheckpoint { community, respond })
            .await
    }

    pub async fn read_last_active(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.submit(|respond| StoreRequest::ReadLastActive { community, member, respond })
            .await
    }

    pub async fn read_all_last_active(
        &self,
        community: CommunityId,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        self.submit(|respond| StoreRequest::ReadAllLastActive { community, respond })
            .await
    }

    pub async fn read_sync_boundary(
        &self,
        community: CommunityId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.submit(|respond| StoreRequest::ReadSyncBoundary { community, respond })
            .await
    }

    pub async fn read_checkpoint(
        &self,
        community: CommunityId,
    ) -> Result<Option<SyncCheckpoint>, StoreError> {
        self.submit(|respond| StoreRequest::ReadCheckpoint { community, respond })
            .await
    }

    pub async fn count_activity(&self, community: CommunityId) -> Result<u64, StoreError> {
        self.submit(|respond| StoreRequest::CountActivity { community, respond })
            .await
    }

    pub async fn delete_member(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<bool, StoreError> {
        self.submit(|respond| StoreRequest::DeleteMember { community, member, respond })
            .await
    }

    /// Stop the writer thread after everything queued ahead of this call has run.
    /// The database connection is closed when this returns.
    pub async fn close(&self) -> Result<(), StoreError> {
        let (done, closed) = oneshot::channel();
        self.tx
            .send(StoreRequest::Shutdown { done })
            .await
            .map_err(|_| StoreError::WorkerUnavailable)?;
        closed.await.map_err(|_| StoreError::WorkerUnavailable)
    }

    #[cfg(test)]
    async fn panic_in_worker(&self) -> Result<(), StoreError> {
        self.submit(|respond| StoreRequest::Panic { respond }).await
    }
}

fn worker_loop(mut db: ActivityDb, mut rx: mpsc::Receiver<StoreRequest>) {
    let mut shutdown = None;
    while let Some(request) = rx.blocking_recv() {
        debug!(op = request.name(), "store request");
        match request {
            StoreRequest::Shutdown { done } => {
                shutdown = Some(done);
                break;
            }
            other => execute(&mut db, other),
        }
    }

    drop(rx);
    drop(db);
    info!("Store writer thread stopped");
    if let Some(done) = shutdown {
        let _ = done.send(());
    }
}

/// Run one request and deliver its result to the submitter.
fn execute(db: &mut ActivityDb, request: StoreRequest) {
    match request {
        StoreRequest::UpsertActivity { community, member, display_name, at, respond } => {
            reply(respond, "upsert_activity", || {
                db.upsert_activity(community, member, &display_name, at)
            })
        }
        StoreRequest::BeginCheckpoint { community, boundary, respond } => {
            reply(respond, "begin_checkpoint", || db.begin_checkpoint(community, boundary))
        }
        StoreRequest::FinalizeCheckpoint { community, respond } => {
            reply(respond, "finalize_checkpoint", || {
                db.finalize_checkpoint(community, Utc::now())
            })
        }
        StoreRequest::ReadLastActive { community, member, respond } => {
            reply(respond, "read_last_active", || db.read_last_active(community, member))
        }
        StoreRequest::ReadAllLastActive { community, respond } => {
            reply(respond, "read_all_last_active", || db.read_all_last_active(community))
        }
        StoreRequest::ReadSyncBoundary { community, respond } => {
            reply(respond, "read_sync_boundary", || db.read_sync_boundary(community))
        }
        StoreRequest::ReadCheckpoint { community, respond } => {
            reply(respond, "read_checkpoint", || db.read_checkpoint(community))
        }
        StoreRequest::CountActivity { community, respond } => {
            reply(respond, "count_activity", || db.count_activity(community))
        }
        StoreRequest::DeleteMember { community, member, respond } => {
            reply(respond, "delete_member", || db.delete_member(community, member))
        }
        StoreRequest::Shutdown { done } => {
            let _ = done.send(());
        }
        #[cfg(test)]
        StoreRequest::Panic { respond } => {
            reply(respond, "panic", || -> Result<(), StoreError> { panic!("operation blew up") })
        }
    }
}

// A failing or panicking operation is reported to its submitter only; the
// worker keeps draining the queue.
fn reply<T>(
    respond: Responder<T>,
    op: &'static str,
    run: impl FnOnce() -> Result<T, StoreError>,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(StoreError::WorkerPanicked(panic_message(payload))));

    if let Err(e) = &result {
        error!(op, error = %e, "Store operation failed");
    }
    if respond.send(result).is_err() {
        warn!(op, "Caller went away before the store responded");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
