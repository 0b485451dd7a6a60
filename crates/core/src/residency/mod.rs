//! Residency interval arithmetic and the violations it gives rise to.
//!
//! Durations are whole minutes, truncated toward zero, and never negative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::group::GroupId;
use crate::domain::residency::{IntervalRelease, TicketGroupLogEntry};
use crate::domain::sla::{Sla, SlaId};
use crate::domain::ticket::TicketSnapshot;
use crate::domain::violation::{NewSlaViolation, ViolationType};

/// Whole minutes between two instants. Seconds are dropped before any budget
/// comparison, so a stay only overruns once a full extra minute has passed.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

/// Computes what gets written onto an active interval released at `now`.
/// Without a budget the interval can never be overdue.
pub fn release_interval(entry: &TicketGroupLogEntry, now: DateTime<Utc>) -> IntervalRelease {
    let time_spent_minutes = elapsed_minutes(entry.assigned_at, now);
    let overdue_minutes =
        entry.budget_minutes.map(|budget| (time_spent_minutes - budget).max(0));

    IntervalRelease { released_at: now, time_spent_minutes, overdue_minutes }
}

/// A released interval that ran past its group budget yields exactly one
/// `group_resolution` violation. `sla_id` is whatever the ticket's SLA
/// resolves to at release time and may be absent.
pub fn group_violation(
    entry: &TicketGroupLogEntry,
    release: &IntervalRelease,
    sla_id: Option<SlaId>,
) -> Option<NewSlaViolation> {
    let budget = entry.budget_minutes?;
    let overdue = release.overdue_minutes.filter(|overdue| *overdue > 0)?;

    Some(NewSlaViolation {
        ticket_id: entry.ticket_id,
        violation_type: ViolationType::GroupResolution,
        executor_group_id: Some(entry.executor_group_id),
        budget_minutes: Some(budget),
        actual_minutes: release.time_spent_minutes,
        overdue_minutes: overdue,
        sla_id,
        violated_at: release.released_at,
    })
}

/// Checks the ticket-level deadlines at closure time. Resolution is judged on
/// `due_date`; first response on `response_due_date` only while the ticket
/// never received a response.
pub fn global_violations(
    ticket: &TicketSnapshot,
    sla: &Sla,
    now: DateTime<Utc>,
) -> Vec<NewSlaViolation> {
    let actual_minutes = elapsed_minutes(ticket.created_at, now);
    let mut violations = Vec::new();

    let deadlines = [
        (ViolationType::GlobalResolution, ticket.due_date, sla.resolution_time_minutes),
        (
            ViolationType::GlobalResponse,
            ticket.response_due_date.filter(|_| !ticket.has_response),
            sla.response_time_minutes,
        ),
    ];

    for (violation_type, deadline, budget_minutes) in deadlines {
        let Some(deadline) = deadline else {
            continue;
        };
        if now <= deadline {
            continue;
        }

        violations.push(NewSlaViolation {
            ticket_id: ticket.id,
            violation_type,
            executor_group_id: None,
            budget_minutes: Some(budget_minutes),
            actual_minutes,
            overdue_minutes: elapsed_minutes(deadline, now),
            sla_id: Some(sla.id),
            violated_at: now,
        });
    }

    violations
}

/// What a change of assignee does to the residency log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResidencyTransition {
    Unchanged,
    Move { from: Option<GroupId>, to: Option<GroupId> },
}

pub fn plan_transition(from: Option<GroupId>, to: Option<GroupId>) -> ResidencyTransition {
    if from == to {
        ResidencyTransition::Unchanged
    } else {
        ResidencyTransition::Move { from, to }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::{
        elapsed_minutes, global_violations, group_violation, plan_transition, release_interval,
        ResidencyTransition,
    };
    use crate::domain::group::GroupId;
    use crate::domain::residency::{ResidencyId, TicketGroupLogEntry};
    use crate::domain::service::ServiceClassification;
    use crate::domain::sla::{Sla, SlaId};
    use crate::domain::ticket::{StatusId, TicketId, TicketSnapshot};
    use crate::domain::violation::ViolationType;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z").expect("valid rfc3339").with_timezone(&Utc)
    }

    fn entry(budget_minutes: Option<i64>) -> TicketGroupLogEntry {
        TicketGroupLogEntry {
            id: ResidencyId(1),
            ticket_id: TicketId(100),
            executor_group_id: GroupId(7),
            assigned_at: t0(),
            released_at: None,
            budget_minutes,
            time_spent_minutes: None,
            overdue_minutes: None,
            assigned_by: None,
        }
    }

    fn sla() -> Sla {
        Sla {
            id: SlaId(3),
            name: "Priority".to_string(),
            response_time_minutes: 30,
            response_notification_minutes: 20,
            resolution_time_minutes: 240,
            resolution_notification_minutes: 200,
            no_response_minutes: None,
            no_response_status_id: None,
        }
    }

    fn ticket() -> TicketSnapshot {
        TicketSnapshot {
            id: TicketId(100),
            status_id: StatusId(1),
            assigned_to: None,
            classification: ServiceClassification::default(),
            created_at: t0(),
            due_date: Some(t0() + Duration::minutes(240)),
            response_due_date: Some(t0() + Duration::minutes(30)),
            has_response: false,
        }
    }

    #[test]
    fn elapsed_minutes_truncates_and_never_goes_negative() {
        assert_eq!(elapsed_minutes(t0(), t0() + Duration::seconds(119)), 1);
        assert_eq!(elapsed_minutes(t0(), t0() - Duration::minutes(5)), 0);
    }

    #[test]
    fn interval_without_budget_is_never_overdue() {
        let entry = entry(None);
        let release = release_interval(&entry, t0() + Duration::days(30));

        assert_eq!(release.time_spent_minutes, 30 * 24 * 60);
        assert_eq!(release.overdue_minutes, None);
        assert!(group_violation(&entry, &release, Some(SlaId(3))).is_none());
    }

    #[test]
    fn interval_within_budget_has_no_violation() {
        let entry = entry(Some(60));
        let release = release_interval(&entry, t0() + Duration::minutes(60));

        assert_eq!(release.overdue_minutes, Some(0));
        assert!(group_violation(&entry, &release, Some(SlaId(3))).is_none());
    }

    #[test]
    fn budget_overruns_count_only_whole_minutes() {
        let entry = entry(Some(60));

        let just_under = release_interval(&entry, t0() + Duration::seconds(60 * 60 + 59));
        assert_eq!(just_under.time_spent_minutes, 60);
        assert_eq!(just_under.overdue_minutes, Some(0));
        assert!(group_violation(&entry, &just_under, None).is_none());

        let one_over = release_interval(&entry, t0() + Duration::minutes(61));
        let violation = group_violation(&entry, &one_over, None).expect("violation expected");
        assert_eq!(violation.overdue_minutes, 1);
    }

    #[test]
    fn interval_over_budget_yields_one_group_violation() {
        let entry = entry(Some(60));
        let release = release_interval(&entry, t0() + Duration::minutes(90));
        let violation = group_violation(&entry, &release, None).expect("violation expected");

        assert_eq!(violation.violation_type, ViolationType::GroupResolution);
        assert_eq!(violation.budget_minutes, Some(60));
        assert_eq!(violation.actual_minutes, 90);
        assert_eq!(violation.overdue_minutes, 30);
        assert_eq!(violation.executor_group_id, Some(GroupId(7)));
        assert_eq!(violation.sla_id, None);
    }

    #[test]
    fn closure_after_both_deadlines_yields_both_global_violations() {
        let now = t0() + Duration::minutes(300);
        let violations = global_violations(&ticket(), &sla(), now);

        assert_eq!(violations.len(), 2);
        let resolution = &violations[0];
        assert_eq!(resolution.violation_type, ViolationType::GlobalResolution);
        assert_eq!(resolution.budget_minutes, Some(240));
        assert_eq!(resolution.actual_minutes, 300);
        assert_eq!(resolution.overdue_minutes, 60);

        let response = &violations[1];
        assert_eq!(response.violation_type, ViolationType::GlobalResponse);
        assert_eq!(response.budget_minutes, Some(30));
        assert_eq!(response.overdue_minutes, 270);
        assert_eq!(response.sla_id, Some(SlaId(3)));
    }

    #[test]
    fn answered_ticket_has_no_response_violation() {
        let mut ticket = ticket();
        ticket.has_response = true;

        let violations = global_violations(&ticket, &sla(), t0() + Duration::minutes(100));
        assert!(violations.is_empty());
    }

    #[test]
    fn deadline_reached_exactly_is_not_a_violation() {
        let mut ticket = ticket();
        ticket.response_due_date = None;

        let violations = global_violations(&ticket, &sla(), t0() + Duration::minutes(240));
        assert!(violations.is_empty());
    }

    #[test]
    fn same_group_on_both_sides_is_unchanged() {
        assert_eq!(plan_transition(None, None), ResidencyTransition::Unchanged);
        assert_eq!(plan_transition(Some(GroupId(1)), Some(GroupId(1))), ResidencyTransition::Unchanged);
        assert_eq!(
            plan_transition(Some(GroupId(1)), None),
            ResidencyTransition::Move { from: Some(GroupId(1)), to: None }
        );
    }
}
