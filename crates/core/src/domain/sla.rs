use serde::{Deserialize, Serialize};

use crate::domain::group::GroupId;
use crate::domain::service::{ServiceId, TicketServiceId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlaId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    pub id: SlaId,
    pub name: String,
    pub response_time_minutes: i64,
    pub response_notification_minutes: i64,
    pub resolution_time_minutes: i64,
    pub resolution_notification_minutes: i64,
    pub no_response_minutes: Option<i64>,
    pub no_response_status_id: Option<i64>,
}

impl Sla {
    /// Checks the write-time invariants of an SLA definition: positive
    /// durations and notification thresholds strictly below their deadline.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidSla("name must not be empty".to_string()));
        }

        let durations = [
            ("response_time_minutes", self.response_time_minutes),
            ("response_notification_minutes", self.response_notification_minutes),
            ("resolution_time_minutes", self.resolution_time_minutes),
            ("resolution_notification_minutes", self.resolution_notification_minutes),
        ];
        for (field, value) in durations {
            if value <= 0 {
                return Err(DomainError::InvalidSla(format!(
                    "{field} must be greater than zero (got {value})"
                )));
            }
        }

        if self.response_notification_minutes >= self.response_time_minutes {
            return Err(DomainError::InvalidSla(format!(
                "response notification ({}m) must come before the response deadline ({}m)",
                self.response_notification_minutes, self.response_time_minutes
            )));
        }
        if self.resolution_notification_minutes >= self.resolution_time_minutes {
            return Err(DomainError::InvalidSla(format!(
                "resolution notification ({}m) must come before the resolution deadline ({}m)",
                self.resolution_notification_minutes, self.resolution_time_minutes
            )));
        }

        if matches!(self.no_response_minutes, Some(value) if value <= 0) {
            return Err(DomainError::InvalidSla(
                "no_response_minutes must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Binds an SLA to a service combo. A null side widens the match, which is
/// what the specificity ladder ranks on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaMapping {
    pub id: i64,
    pub sla_id: SlaId,
    pub ticket_service_id: Option<TicketServiceId>,
    pub service_id: Option<ServiceId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaGroupBudget {
    pub sla_id: SlaId,
    pub executor_group_id: GroupId,
    pub resolution_minutes: Option<i64>,
    pub response_minutes: Option<i64>,
    pub sort_order: i64,
}

#[cfg(test)]
mod tests {
    use super::{Sla, SlaId};
    use crate::errors::DomainError;

    fn standard() -> Sla {
        Sla {
            id: SlaId(1),
            name: "Standard".to_string(),
            response_time_minutes: 60,
            response_notification_minutes: 45,
            resolution_time_minutes: 480,
            resolution_notification_minutes: 420,
            no_response_minutes: None,
            no_response_status_id: None,
        }
    }

    #[test]
    fn well_formed_sla_passes_validation() {
        assert_eq!(standard().validate(), Ok(()));
    }

    #[test]
    fn notification_equal_to_deadline_is_rejected() {
        let mut sla = standard();
        sla.response_notification_minutes = 60;

        let error = sla.validate().expect_err("notification at deadline must fail");
        assert!(matches!(error, DomainError::InvalidSla(ref message) if message.contains("response")));
    }

    #[test]
    fn resolution_notification_after_deadline_is_rejected() {
        let mut sla = standard();
        sla.resolution_notification_minutes = 500;

        assert!(sla.validate().is_err());
    }

    #[test]
    fn non_positive_escalation_window_is_rejected() {
        let mut sla = standard();
        sla.no_response_minutes = Some(0);

        assert!(sla.validate().is_err());
    }
}
