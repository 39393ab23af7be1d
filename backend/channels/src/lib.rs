//! Discord adapter for lastseen.
//!
//! [`DiscordAdapter`] connects to the gateway, records message activity,
//! backfills history for every guild, and answers slash and text commands.
//! [`DiscordSource`] implements the history and member-directory contracts
//! over serenity's HTTP client and cache.

pub mod discord;
pub mod discord_slash;
pub mod discord_source;

pub use discord::{DiscordAdapter, DiscordConfig};
pub use discord_source::{snowflake_time, DiscordSource, DISCORD_EPOCH_MS};
