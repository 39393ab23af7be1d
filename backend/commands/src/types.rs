/// Command surface types.
use lastseen_core::{CommunityId, MemberId};
use serde::{Deserialize, Serialize};

/// Discord rejects messages longer than this.
pub const MAX_REPLY_LEN: usize = 2000;

// ---------------------------------------------------------------------------
// Arg
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// Whole number (a day count).
    Integer,
    /// A member of the community: id, mention or exact name.
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandArg {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub required: bool,
}

// ---------------------------------------------------------------------------
// Command definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDef {
    /// Unique key, also the slash command name (e.g. "inactive").
    pub key: String,
    pub description: String,
    /// Extra names accepted after the text prefix, besides the key.
    pub text_aliases: Vec<String>,
    pub args: Vec<CommandArg>,
    /// Only members with administrator permission may run it.
    pub admin_only: bool,
    /// Reply is posted to the channel instead of only to the invoker.
    pub public_reply: bool,
}

impl CommandDef {
    pub fn answers_to(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
            || self.text_aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A parsed command, from a slash interaction or a prefixed text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub key: String,
    /// Positional argument values in definition order. Missing optional
    /// arguments are simply absent.
    pub args: Vec<String>,
}

impl CommandInvocation {
    pub fn new(key: impl Into<String>, args: Vec<String>) -> Self {
        Self { key: key.into(), args }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// Who invoked a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub community: CommunityId,
    pub invoker: MemberId,
    pub is_admin: bool,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub text: String,
    /// Only visible to the invoker.
    pub ephemeral: bool,
}

impl CommandResponse {
    pub fn public(text: impl Into<String>) -> Self {
        Self { text: text.into(), ephemeral: false }
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { text: text.into(), ephemeral: true }
    }

    /// The reply split into messages of at most [`MAX_REPLY_LEN`] characters,
    /// breaking on line boundaries where possible.
    pub fn chunks(&self) -> Vec<String> {
        split_message(&self.text, MAX_REPLY_LEN)
    }
}

fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    // Whether `current` holds at least one line (possibly empty).
    let mut open = false;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let sep = usize::from(open);
        if current_len + sep + line_len <= limit {
            if open {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep + line_len;
            open = true;
            continue;
        }

        if open {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
            open = false;
        }
        // A single line over the limit is cut at character boundaries.
        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(limit).collect();
            let piece_len = piece.chars().count();
            if piece_len == limit && chars.peek().is_some() {
                chunks.push(piece);
            } else {
                current = piece;
                current_len = piece_len;
                open = true;
            }
        }
    }
    if open || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
