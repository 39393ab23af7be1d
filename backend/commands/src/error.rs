use lastseen_core::{CommunityId, LastSeenError, SourceError};
use lastseen_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    /// Backfill for the community has not completed yet.
    #[error("community {0} is still syncing")]
    StillSyncing(CommunityId),

    #[error("/{0} is restricted to administrators")]
    NotPermitted(String),

    #[error("{0}")]
    BadArgument(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("member directory failure: {0}")]
    Directory(#[from] SourceError),
}

impl CommandError {
    pub fn bad_argument(message: impl Into<String>) -> Self {
        CommandError::BadArgument(message.into())
    }

    /// Text shown to the invoker in place of a normal reply.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::StillSyncing(_) => {
                "Still syncing message history for this server, please try again in a few minutes."
                    .to_string()
            }
            CommandError::NotPermitted(key) => {
                format!("**You need administrator permission to use /{key}.**")
            }
            CommandError::BadArgument(message) => format!("**{message}**"),
            CommandError::Storage(_) | CommandError::Directory(_) => {
                "Something went wrong while running this command. Check the bot logs.".to_string()
            }
        }
    }
}

impl From<CommandError> for LastSeenError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::StillSyncing(community) => LastSeenError::StillSyncing(community),
            CommandError::Storage(e) => e.into(),
            CommandError::Directory(SourceError::PermissionDenied(channel)) => {
                LastSeenError::PermissionDenied(format!("channel {channel}"))
            }
            CommandError::Directory(e) => LastSeenError::EventSourceFailure(e.to_string()),
            other => LastSeenError::Other(other.into()),
        }
    }
}
