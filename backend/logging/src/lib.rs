//! Logging for lastseen.
//!
//! Console output for operators, a daily-rolling JSON file for later digging,
//! and redaction of Discord bot tokens before they reach either.

pub mod logger;
pub mod redact;

pub use logger::{init_logger, LOG_FILE_PREFIX};
pub use redact::redact_token;
