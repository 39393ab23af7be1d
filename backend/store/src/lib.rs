//! Persistence for lastseen.
//!
//! All SQLite access goes through one [`ActivityDb`] owned by a dedicated
//! writer thread. Async callers talk to it through a cloneable [`StoreHandle`],
//! which enqueues one request per call and awaits its private response.

pub mod allowlist;
pub mod bridge;
pub mod engine;
pub mod error;

pub use allowlist::AllowlistStore;
pub use bridge::{StoreHandle, DEFAULT_QUEUE_DEPTH};
pub use engine::{ActivityDb, ActivityRecord, SyncCheckpoint};
pub use error::StoreError;
