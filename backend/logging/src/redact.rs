//! Token redaction for log output.

use regex::Regex;
use std::sync::LazyLock;

// Three base64url segments: user id, timestamp, HMAC.
static DISCORD_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[MNO][A-Za-z\d_-]{23,27}\.[A-Za-z\d_-]{6}\.[A-Za-z\d_-]{27,40}").unwrap()
});
static BOT_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Bot|Bearer)\s+[A-Za-z\d\-\._~+/]+=*").unwrap());

/// Mask Discord bot tokens and authorization header values in `input`.
pub fn redact_token(input: &str) -> String {
    let redacted = BOT_HEADER_RE.replace_all(input, "$1 [REDACTED_TOKEN]");
    DISCORD_TOKEN_RE.replace_all(&redacted, "[REDACTED_TOKEN]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "MTA5ODc2NTQzMjEwOTg3NjU0.GaBcDe.abcdefghijklmnopqrstuvwxyz0123456789AB";

    #[test]
    fn masks_bare_token() {
        let clean = redact_token(&format!("token={TOKEN} rejected"));
        assert_eq!(clean, "token=[REDACTED_TOKEN] rejected");
    }

    #[test]
    fn masks_authorization_header() {
        let clean = redact_token(&format!("Authorization: Bot {TOKEN}"));
        assert!(!clean.contains(TOKEN));
        assert!(clean.contains("Bot [REDACTED_TOKEN]"));
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let text = "backfill complete for community 123456789012345678";
        assert_eq!(redact_token(text), text);
    }
}
