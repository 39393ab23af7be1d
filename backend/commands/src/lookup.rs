//! Parsing command arguments that name members or day counts.

use std::sync::LazyLock;

use lastseen_core::{MemberId, MemberInfo};
use regex::Regex;

use crate::error::CommandError;
use crate::report::DEFAULT_INACTIVE_DAYS;

const MAX_DAYS: i64 = 3650;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").expect("valid regex"));

/// Day count argument; absent means the default.
pub fn parse_days(raw: Option<&str>) -> Result<i64, CommandError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_INACTIVE_DAYS);
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if (1..=MAX_DAYS).contains(&days) => Ok(days),
        _ => Err(CommandError::bad_argument(format!(
            "Number of days must be a whole number between 1 and {MAX_DAYS}, got `{raw}`"
        ))),
    }
}

/// Find a member by mention (`<@123>`), raw id or exact name.
pub fn resolve_member<'a>(members: &'a [MemberInfo], raw: &str) -> Option<&'a MemberInfo> {
    let raw = raw.trim();
    let id = parse_member_id(raw);

    if let Some(id) = id {
        if let Some(found) = members.iter().find(|m| m.id == id) {
            return Some(found);
        }
    }
    members.iter().find(|m| m.name == raw)
}

/// Member id from a mention or raw id, without consulting the member list.
pub fn parse_member_id(raw: &str) -> Option<MemberId> {
    let raw = raw.trim();
    MENTION_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<MemberInfo> {
        vec![
            MemberInfo { id: MemberId(111), name: "alice".into(), automated: false },
            MemberInfo { id: MemberId(222), name: "bob".into(), automated: false },
        ]
    }

    #[test]
    fn days_default_and_bounds() {
        assert_eq!(parse_days(None).unwrap(), 30);
        assert_eq!(parse_days(Some("45")).unwrap(), 45);
        assert!(matches!(parse_days(Some("0")), Err(CommandError::BadArgument(_))));
        assert!(matches!(parse_days(Some("ten")), Err(CommandError::BadArgument(_))));
    }

    #[test]
    fn members_resolve_by_mention_id_or_name() {
        let members = members();
        assert_eq!(resolve_member(&members, "<@222>").unwrap().name, "bob");
        assert_eq!(resolve_member(&members, "<@!111>").unwrap().name, "alice");
        assert_eq!(resolve_member(&members, "111").unwrap().name, "alice");
        assert_eq!(resolve_member(&members, "bob").unwrap().id, MemberId(222));
        assert!(resolve_member(&members, "carol").is_none());
        assert!(resolve_member(&members, "<@999>").is_none());
    }

    #[test]
    fn member_ids_parse_without_lookup() {
        assert_eq!(parse_member_id("<@!42>"), Some(MemberId(42)));
        assert_eq!(parse_member_id(" 42 "), Some(MemberId(42)));
        assert_eq!(parse_member_id("bob"), None);
    }
}
