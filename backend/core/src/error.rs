use thiserror::Error;

use crate::types::CommunityId;

/// Top-level error type for the lastseen runtime.
#[derive(Debug, Error)]
pub enum LastSeenError {
    /// A queued storage operation failed (I/O or constraint violation).
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A history page fetch or live-event delivery failed.
    #[error("event source failure: {0}")]
    EventSourceFailure(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A command was invoked before the community finished its backfill.
    #[error("community {0} is still syncing")]
    StillSyncing(CommunityId),

    #[error("missing required credential: {0}")]
    MissingCredential(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LastSeenError {
    /// Whether the process must stop. Only a missing credential is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LastSeenError::MissingCredential(_))
    }
}
