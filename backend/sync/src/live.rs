use lastseen_core::ActivityEvent;
use lastseen_store::{StoreError, StoreHandle};
use tracing::{debug, trace};

/// Writes message-created events straight to the store as they arrive.
///
/// Live writes never wait on readiness; they race freely with a backfill of the
/// same community and the store keeps whichever timestamp is newer.
#[derive(Clone)]
pub struct LiveRecorder {
    store: StoreHandle,
}

impl LiveRecorder {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Record one event. Returns whether the stored last-active time moved.
    pub async fn record(&self, event: &ActivityEvent) -> Result<bool, StoreError> {
        if event.automated {
            trace!(member = %event.member, "Ignoring automated message");
            return Ok(false);
        }
        let Some(community) = event.community else {
            trace!(member = %event.member, "Ignoring message outside any community");
            return Ok(false);
        };

        let advanced = self
            .store
            .upsert_activity(community, event.member, event.display_name.clone(), event.at)
            .await?;
        if advanced {
            debug!(%community, member = %event.member, "Live activity recorded");
        }
        Ok(advanced)
    }
}
