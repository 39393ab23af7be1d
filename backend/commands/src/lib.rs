//! The lastseen command surface.
//!
//! Commands arrive either as Discord slash interactions or as prefixed text
//! messages; both are parsed into a [`CommandInvocation`] and routed through the
//! [`CommandDispatcher`]. Reads of activity data go through [`ActivityQueries`],
//! which refuses to answer for a community until its backfill has completed.

pub mod detection;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod lookup;
pub mod queries;
pub mod registry;
pub mod report;
pub mod types;

use std::sync::Arc;

pub use detection::detect_command;
pub use dispatch::{CommandDispatcher, CommandHandler};
pub use error::CommandError;
pub use handlers::{
    CommandServices, InactiveHandler, KickInactiveHandler, LastSeenHandler, SyncStatusHandler,
    WhitelistAddHandler, WhitelistRemoveHandler, WhitelistShowHandler,
};
pub use queries::ActivityQueries;
pub use registry::{builtin_commands, CommandRegistry};
pub use report::{find_inactive, InactivityReport, DEFAULT_INACTIVE_DAYS};
pub use types::{
    ArgType, CommandArg, CommandContext, CommandDef, CommandInvocation, CommandResponse,
    MAX_REPLY_LEN,
};

/// Build a dispatcher wired with every built-in handler.
pub fn build_dispatcher(services: CommandServices) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::new(CommandRegistry::new());

    dispatcher.register("inactive", Arc::new(InactiveHandler { services: services.clone() }));
    dispatcher.register("kick_inactive", Arc::new(KickInactiveHandler { services: services.clone() }));
    dispatcher.register("lastseen", Arc::new(LastSeenHandler { services: services.clone() }));
    dispatcher.register("sync_status", Arc::new(SyncStatusHandler { services: services.clone() }));
    dispatcher.register("whitelist_show", Arc::new(WhitelistShowHandler { services: services.clone() }));
    dispatcher.register("whitelist_add", Arc::new(WhitelistAddHandler { services: services.clone() }));
    dispatcher.register("whitelist_remove", Arc::new(WhitelistRemoveHandler { services }));

    dispatcher
}
