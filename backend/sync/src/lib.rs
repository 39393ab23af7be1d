//! Keeps the activity store caught up with channel history.
//!
//! - [`ReadinessTracker`]: per-community ready / not-ready gate for commands.
//! - [`Backfiller`]: resumable, checkpointed history walk per community.
//! - [`LiveRecorder`]: records message-created events as they arrive.
//! - [`resync_loop`]: periodically retries communities whose last pass was interrupted.

pub mod backfill;
pub mod live;
pub mod readiness;
pub mod resync;

pub use backfill::{BackfillOutcome, BackfillStats, Backfiller, Interruption, SyncSettings};
pub use live::LiveRecorder;
pub use readiness::{PendingBatch, ReadinessTracker};
pub use resync::{resync_loop, resync_once};
