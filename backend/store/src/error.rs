use lastseen_core::LastSeenError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed allow-list file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage worker is not running")]
    WorkerUnavailable,

    #[error("storage operation panicked: {0}")]
    WorkerPanicked(String),
}

impl From<StoreError> for LastSeenError {
    fn from(err: StoreError) -> Self {
        LastSeenError::StorageFailure(err.to_string())
    }
}
