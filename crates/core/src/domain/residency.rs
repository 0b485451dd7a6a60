use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::group::{GroupId, UserId};
use crate::domain::ticket::TicketId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResidencyId(pub i64);

/// One row of the ticket group log. `released_at` is `None` while the group
/// still owns the ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGroupLogEntry {
    pub id: ResidencyId,
    pub ticket_id: TicketId,
    pub executor_group_id: GroupId,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub budget_minutes: Option<i64>,
    pub time_spent_minutes: Option<i64>,
    pub overdue_minutes: Option<i64>,
    pub assigned_by: Option<UserId>,
}

impl TicketGroupLogEntry {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResidencyInterval {
    pub ticket_id: TicketId,
    pub executor_group_id: GroupId,
    pub assigned_at: DateTime<Utc>,
    pub budget_minutes: Option<i64>,
    pub assigned_by: Option<UserId>,
}

/// Values written onto an active interval when it is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRelease {
    pub released_at: DateTime<Utc>,
    pub time_spent_minutes: i64,
    pub overdue_minutes: Option<i64>,
}
