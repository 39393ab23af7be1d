//! Who counts as inactive.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use lastseen_core::{MemberId, MemberInfo};
use lastseen_store::ActivityRecord;

pub const DEFAULT_INACTIVE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactivityReport {
    pub days: i64,
    pub cutoff: DateTime<Utc>,
    /// Inactive and not allow-listed, sorted by name.
    pub inactive: Vec<MemberInfo>,
    /// Inactive but allow-listed, sorted by name.
    pub allowlisted: Vec<MemberInfo>,
}

/// Split the community's human members into inactive groups. A member is
/// inactive when there is no record for them or the record is older than
/// `now - days`.
pub fn find_inactive(
    members: &[MemberInfo],
    activity: &HashMap<MemberId, ActivityRecord>,
    allowlist: &BTreeSet<MemberId>,
    days: i64,
    now: DateTime<Utc>,
) -> InactivityReport {
    let cutoff = now - Duration::days(days);
    let (mut allowlisted, mut inactive): (Vec<_>, Vec<_>) = members
        .iter()
        .filter(|m| !m.automated)
        .filter(|m| activity.get(&m.id).map_or(true, |r| r.last_active < cutoff))
        .cloned()
        .partition(|m| allowlist.contains(&m.id));

    let by_name = |a: &MemberInfo, b: &MemberInfo| a.name.cmp(&b.name).then(a.id.cmp(&b.id));
    inactive.sort_by(by_name);
    allowlisted.sort_by(by_name);

    InactivityReport { days, cutoff, inactive, allowlisted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lastseen_core::CommunityId;

    fn member(id: u64, name: &str, automated: bool) -> MemberInfo {
        MemberInfo { id: MemberId(id), name: name.to_string(), automated }
    }

    fn record(id: u64, at: DateTime<Utc>) -> (MemberId, ActivityRecord) {
        (MemberId(id), ActivityRecord {
            community: CommunityId(1),
            member: MemberId(id),
            display_name: String::new(),
            last_active: at,
        })
    }

    #[test]
    fn partitions_and_sorts() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let members = vec![
            member(1, "zed", false),
            member(2, "amy", false),
            member(3, "active", false),
            member(4, "robot", true),
            member(5, "kept", false),
            member(6, "bea", false),
        ];
        let activity: HashMap<_, _> = [
            record(1, now - Duration::days(45)),
            record(3, now - Duration::days(2)),
            record(6, now - Duration::days(31)),
        ]
        .into_iter()
        .collect();
        let allowlist: BTreeSet<_> = [MemberId(5)].into_iter().collect();

        let report = find_inactive(&members, &activity, &allowlist, 30, now);
        let names: Vec<_> = report.inactive.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["amy", "bea", "zed"]);
        assert_eq!(report.allowlisted, vec![member(5, "kept", false)]);
        assert_eq!(report.cutoff, now - Duration::days(30));
    }

    #[test]
    fn activity_exactly_at_cutoff_is_active() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let members = vec![member(1, "edge", false)];
        let activity: HashMap<_, _> = [record(1, now - Duration::days(30))].into_iter().collect();

        let report = find_inactive(&members, &activity, &BTreeSet::new(), 30, now);
        assert!(report.inactive.is_empty());
    }
}
