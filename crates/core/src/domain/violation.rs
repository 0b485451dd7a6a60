use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::group::GroupId;
use crate::domain::sla::SlaId;
use crate::domain::ticket::TicketId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViolationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    GroupResolution,
    GlobalResolution,
    GlobalResponse,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupResolution => "group_resolution",
            Self::GlobalResolution => "global_resolution",
            Self::GlobalResponse => "global_response",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "group_resolution" => Some(Self::GroupResolution),
            "global_resolution" => Some(Self::GlobalResolution),
            "global_response" => Some(Self::GlobalResponse),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::GlobalResolution | Self::GlobalResponse)
    }
}

/// Append-only record that an elapsed duration exceeded its budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaViolation {
    pub id: ViolationId,
    pub ticket_id: TicketId,
    pub violation_type: ViolationType,
    pub executor_group_id: Option<GroupId>,
    pub budget_minutes: Option<i64>,
    pub actual_minutes: i64,
    pub overdue_minutes: i64,
    pub sla_id: Option<SlaId>,
    pub violated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSlaViolation {
    pub ticket_id: TicketId,
    pub violation_type: ViolationType,
    pub executor_group_id: Option<GroupId>,
    pub budget_minutes: Option<i64>,
    pub actual_minutes: i64,
    pub overdue_minutes: i64,
    pub sla_id: Option<SlaId>,
    pub violated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ViolationType;

    #[test]
    fn violation_type_round_trips_from_storage_encoding() {
        let cases = [
            ViolationType::GroupResolution,
            ViolationType::GlobalResolution,
            ViolationType::GlobalResponse,
        ];

        for violation_type in cases {
            assert_eq!(ViolationType::parse(violation_type.as_str()), Some(violation_type));
        }
    }

    #[test]
    fn serde_encoding_matches_storage_encoding() {
        let encoded =
            serde_json::to_string(&ViolationType::GlobalResponse).expect("serialize violation type");
        assert_eq!(encoded, "\"global_response\"");
    }

    #[test]
    fn unknown_violation_type_is_rejected() {
        assert_eq!(ViolationType::parse("response_breach"), None);
        assert!(!ViolationType::GroupResolution.is_global());
        assert!(ViolationType::GlobalResolution.is_global());
    }
}
