use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::group::UserId;
use crate::domain::service::ServiceClassification;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusId(pub i64);

/// The slice of a ticket record the engine reads. The record itself belongs
/// to the ticket CRUD layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    pub id: TicketId,
    pub status_id: StatusId,
    pub assigned_to: Option<UserId>,
    pub classification: ServiceClassification,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub response_due_date: Option<DateTime<Utc>>,
    pub has_response: bool,
}
