//! Executor routing rules that do not touch storage: choosing a member inside
//! a resolved group and deciding which group currently owns a user's work.

use std::cmp::Reverse;

use crate::domain::group::{GroupId, MemberCandidate, Membership, UserId};

/// Picks the assignee inside a group.
///
/// Leads outrank everyone else regardless of load. Among equal lead status the
/// member with the fewest open tickets wins, and the lowest user id breaks any
/// remaining tie. Load is only compared inside this one group.
pub fn pick_member(candidates: &[MemberCandidate]) -> Option<UserId> {
    candidates
        .iter()
        .min_by_key(|candidate| {
            (Reverse(candidate.is_lead), candidate.open_ticket_count, candidate.user_id)
        })
        .map(|candidate| candidate.user_id)
}

/// Selects the group that owns a user's work from their memberships in active
/// groups: lead membership first, then the most recently joined group, then
/// the lowest group id.
pub fn primary_group(memberships: &[Membership]) -> Option<GroupId> {
    memberships
        .iter()
        .min_by_key(|membership| {
            (Reverse(membership.is_lead), Reverse(membership.joined_at), membership.group_id)
        })
        .map(|membership| membership.group_id)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::{pick_member, primary_group};
    use crate::domain::group::{GroupId, MemberCandidate, Membership, UserId};

    fn candidate(user_id: i64, is_lead: bool, open_ticket_count: u32) -> MemberCandidate {
        MemberCandidate { user_id: UserId(user_id), is_lead, open_ticket_count }
    }

    fn membership(group_id: i64, is_lead: bool, joined_at: &str) -> Membership {
        Membership { group_id: GroupId(group_id), is_lead, joined_at: parse_ts(joined_at) }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[test]
    fn lead_outranks_lower_load() {
        let candidates = [candidate(7, true, 3), candidate(8, false, 1)];
        assert_eq!(pick_member(&candidates), Some(UserId(7)));
    }

    #[test]
    fn lowest_load_wins_among_non_leads() {
        let candidates = [candidate(3, false, 4), candidate(5, false, 0), candidate(9, false, 2)];
        assert_eq!(pick_member(&candidates), Some(UserId(5)));
    }

    #[test]
    fn equal_load_falls_back_to_lowest_user_id() {
        let candidates = [candidate(12, true, 1), candidate(4, true, 1), candidate(2, false, 0)];
        assert_eq!(pick_member(&candidates), Some(UserId(4)));
    }

    #[test]
    fn empty_group_has_no_pick() {
        assert_eq!(pick_member(&[]), None);
    }

    #[test]
    fn pick_is_independent_of_candidate_order() {
        let mut candidates =
            vec![candidate(21, false, 2), candidate(20, false, 2), candidate(22, true, 9)];
        let first = pick_member(&candidates);
        candidates.reverse();
        assert_eq!(pick_member(&candidates), first);
        assert_eq!(first, Some(UserId(22)));
    }

    #[test]
    fn lead_membership_wins_over_recent_membership() {
        let memberships = [
            membership(1, true, "2026-01-01T00:00:00Z"),
            membership(2, false, "2026-06-01T00:00:00Z"),
        ];
        assert_eq!(primary_group(&memberships), Some(GroupId(1)));
    }

    #[test]
    fn most_recent_membership_wins_among_equal_lead_status() {
        let memberships = [
            membership(4, false, "2026-01-01T00:00:00Z"),
            membership(3, false, "2026-03-01T00:00:00Z"),
        ];
        assert_eq!(primary_group(&memberships), Some(GroupId(3)));
    }

    #[test]
    fn identical_memberships_fall_back_to_lowest_group_id() {
        let memberships = [
            membership(9, false, "2026-03-01T00:00:00Z"),
            membership(6, false, "2026-03-01T00:00:00Z"),
        ];
        assert_eq!(primary_group(&memberships), Some(GroupId(6)));
        assert_eq!(primary_group(&[]), None);
    }
}
