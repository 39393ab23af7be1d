use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lastseen_core::LastSeenError;
use lastseen_store::DEFAULT_QUEUE_DEPTH;
use lastseen_sync::backfill::{DEFAULT_CHANNEL_CONCURRENCY, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use lastseen_sync::SyncSettings;

pub const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
const DEFAULT_RESYNC_SECS: u64 = 900;

/// lastseen runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Discord bot token. Only `run` needs it.
    pub token: Option<String>,
    pub working_dir: PathBuf,
    pub db_path: PathBuf,
    pub whitelist_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub backfill_days: i64,
    pub resync_secs: u64,
    pub channel_concurrency: usize,
    pub queue_depth: usize,
    pub command_prefix: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("working_dir", &self.working_dir)
            .field("db_path", &self.db_path)
            .field("whitelist_dir", &self.whitelist_dir)
            .field("log_dir", &self.log_dir)
            .field("log_level", &self.log_level)
            .field("backfill_days", &self.backfill_days)
            .field("resync_secs", &self.resync_secs)
            .field("channel_concurrency", &self.channel_concurrency)
            .field("queue_depth", &self.queue_depth)
            .field("command_prefix", &self.command_prefix)
            .finish()
    }
}

fn parse_var<T: FromStr>(
    env: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, LastSeenError> {
    match env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| LastSeenError::Config(format!("{name} has an invalid value: {raw:?}"))),
    }
}

impl Config {
    /// Load from the process environment (after an optional `.env` file).
    pub fn from_env() -> Result<Self, LastSeenError> {
        let _ = dotenvy::dotenv();
        Self::from_env_with(&std::env::vars().collect())
    }

    /// Load from a provided map (useful for testing).
    pub fn from_env_with(env: &HashMap<String, String>) -> Result<Self, LastSeenError> {
        let var = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let working_dir = match var("WORKING_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()
                .map_err(|e| LastSeenError::Config(format!("cannot resolve current directory: {e}")))?,
        };
        let db_path = var("LASTSEEN_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join("activity.db"));
        let whitelist_dir = var("LASTSEEN_WHITELIST_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join("whitelists"));
        let log_dir = var("LASTSEEN_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.clone());

        let config = Self {
            token: var(TOKEN_VAR).map(str::to_string),
            log_level: var("RUST_LOG").unwrap_or("info").to_string(),
            backfill_days: parse_var(env, "LASTSEEN_BACKFILL_DAYS", DEFAULT_WINDOW_DAYS)?,
            resync_secs: parse_var(env, "LASTSEEN_RESYNC_SECS", DEFAULT_RESYNC_SECS)?,
            channel_concurrency: parse_var(env, "LASTSEEN_CHANNEL_CONCURRENCY", DEFAULT_CHANNEL_CONCURRENCY)?,
            queue_depth: parse_var(env, "LASTSEEN_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH)?,
            command_prefix: env
                .get("LASTSEEN_COMMAND_PREFIX")
                .cloned()
                .unwrap_or_else(|| "!".to_string()),
            working_dir,
            db_path,
            whitelist_dir,
            log_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LastSeenError> {
        if !(1..=MAX_WINDOW_DAYS).contains(&self.backfill_days) {
            return Err(LastSeenError::Config(format!(
                "LASTSEEN_BACKFILL_DAYS must be between 1 and {MAX_WINDOW_DAYS}"
            )));
        }
        if self.resync_secs == 0 {
            return Err(LastSeenError::Config("LASTSEEN_RESYNC_SECS must be positive".into()));
        }
        if self.channel_concurrency == 0 || self.queue_depth == 0 {
            return Err(LastSeenError::Config(
                "LASTSEEN_CHANNEL_CONCURRENCY and LASTSEEN_QUEUE_DEPTH must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The bot token, or the one fatal startup error.
    pub fn bot_token(&self) -> Result<&str, LastSeenError> {
        self.token
            .as_deref()
            .ok_or_else(|| LastSeenError::MissingCredential(TOKEN_VAR.to_string()))
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            window: chrono::Duration::days(self.backfill_days),
            channel_concurrency: self.channel_concurrency,
        }
    }

    pub fn resync_every(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_hang_off_working_dir() {
        let config = Config::from_env_with(&env(&[("WORKING_DIR", "/srv/bot")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/bot/activity.db"));
        assert_eq!(config.whitelist_dir, PathBuf::from("/srv/bot/whitelists"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/bot"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backfill_days, 60);
        assert_eq!(config.resync_every(), Duration::from_secs(900));
        assert_eq!(config.channel_concurrency, 4);
        assert_eq!(config.queue_depth, 256);
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.sync_settings().window, chrono::Duration::days(60));
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_env_with(&env(&[
            ("WORKING_DIR", "/srv/bot"),
            ("LASTSEEN_DB", "/var/lib/lastseen.db"),
            ("LASTSEEN_BACKFILL_DAYS", "14"),
            ("LASTSEEN_COMMAND_PREFIX", "?"),
            ("RUST_LOG", "lastseen=debug"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/lastseen.db"));
        assert_eq!(config.backfill_days, 14);
        assert_eq!(config.command_prefix, "?");
        assert_eq!(config.log_level, "lastseen=debug");
    }

    #[test]
    fn missing_token_is_fatal_only_when_asked_for() {
        let config = Config::from_env_with(&env(&[("WORKING_DIR", "/srv/bot")])).unwrap();
        let err = config.bot_token().unwrap_err();
        assert!(err.is_fatal());

        let config = Config::from_env_with(&env(&[
            ("WORKING_DIR", "/srv/bot"),
            (TOKEN_VAR, "  abc.def.ghi  "),
        ]))
        .unwrap();
        assert_eq!(config.bot_token().unwrap(), "abc.def.ghi");
        assert!(!format!("{config:?}").contains("abc.def.ghi"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_env_with(&env(&[
            ("WORKING_DIR", "/srv/bot"),
            ("LASTSEEN_RESYNC_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, LastSeenError::Config(_)));

        let err = Config::from_env_with(&env(&[
            ("WORKING_DIR", "/srv/bot"),
            ("LASTSEEN_QUEUE_DEPTH", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, LastSeenError::Config(_)));
    }

    #[test]
    fn backfill_window_is_bounded() {
        for days in ["0", "3651", "9223372036854775807"] {
            let err = Config::from_env_with(&env(&[
                ("WORKING_DIR", "/srv/bot"),
                ("LASTSEEN_BACKFILL_DAYS", days),
            ]))
            .unwrap_err();
            assert!(matches!(err, LastSeenError::Config(_)), "{days}: {err:?}");
        }

        let config = Config::from_env_with(&env(&[
            ("WORKING_DIR", "/srv/bot"),
            ("LASTSEEN_BACKFILL_DAYS", "3650"),
        ]))
        .unwrap();
        let floor = chrono::Utc::now() - config.sync_settings().window;
        assert!(floor.timestamp() > 0);
    }
}
