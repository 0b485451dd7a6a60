use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub i64);

/// A user's membership in an active group, as seen when deciding which group
/// currently owns that user's work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub is_lead: bool,
    pub joined_at: DateTime<Utc>,
}

/// An active member of a resolved group together with the number of open
/// tickets currently assigned to them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCandidate {
    pub user_id: UserId,
    pub is_lead: bool,
    pub open_ticket_count: u32,
}
