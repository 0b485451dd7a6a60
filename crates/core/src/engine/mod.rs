//! The routing and residency engine.
//!
//! `SlaEngine` holds no state of its own beyond a clock. Every read and write
//! goes through an [`EngineStore`] that is expected to be bound to the
//! caller's transaction, so a failed call leaves nothing behind once the
//! caller rolls back.

pub mod clock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::group::{GroupId, MemberCandidate, Membership, UserId};
use crate::domain::residency::{
    IntervalRelease, NewResidencyInterval, ResidencyId, TicketGroupLogEntry,
};
use crate::domain::service::{ServiceClassification, ServiceCombo, ServiceId, TicketServiceId};
use crate::domain::sla::{Sla, SlaGroupBudget, SlaId, SlaMapping};
use crate::domain::ticket::{TicketId, TicketSnapshot};
use crate::domain::violation::{NewSlaViolation, ViolationId};
use crate::errors::{ApplicationError, DomainError};
use crate::residency::{self, ResidencyTransition};
use crate::resolution::select_sla_mapping;
use crate::routing::{pick_member, primary_group};

pub use clock::{Clock, ManualClock, SystemClock};

/// Storage seen by the engine. Implementations answer "not found" with
/// `Ok(None)` or an empty list; errors are reserved for persistence failures.
#[async_trait]
pub trait EngineStore: Send {
    /// Serializes concurrent mutations of one ticket for the rest of the
    /// current transaction.
    async fn lock_ticket(&mut self, ticket_id: TicketId) -> Result<(), ApplicationError>;

    async fn find_ticket(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketSnapshot>, ApplicationError>;

    /// Lowest-id direct mapping for exactly this combo whose user is active.
    async fn find_direct_user(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<UserId>, ApplicationError>;

    /// Lowest-id group mapping for exactly this combo whose group is both
    /// active and open to automatic assignment.
    async fn find_auto_assign_group(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<GroupId>, ApplicationError>;

    /// Active members of the group with their open ticket counts.
    async fn list_group_candidates(
        &mut self,
        group_id: GroupId,
    ) -> Result<Vec<MemberCandidate>, ApplicationError>;

    /// The user's memberships in active groups.
    async fn list_user_memberships(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<Membership>, ApplicationError>;

    /// SLA mappings that could match the classification on at least one side.
    async fn list_sla_mappings(
        &mut self,
        classification: &ServiceClassification,
    ) -> Result<Vec<SlaMapping>, ApplicationError>;

    async fn find_sla(&mut self, sla_id: SlaId) -> Result<Option<Sla>, ApplicationError>;

    async fn find_group_budget(
        &mut self,
        sla_id: SlaId,
        group_id: GroupId,
    ) -> Result<Option<SlaGroupBudget>, ApplicationError>;

    async fn list_active_intervals(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketGroupLogEntry>, ApplicationError>;

    async fn insert_interval(
        &mut self,
        interval: &NewResidencyInterval,
    ) -> Result<ResidencyId, ApplicationError>;

    async fn release_interval(
        &mut self,
        id: ResidencyId,
        release: &IntervalRelease,
    ) -> Result<(), ApplicationError>;

    async fn append_violation(
        &mut self,
        violation: &NewSlaViolation,
    ) -> Result<ViolationId, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedInterval {
    pub interval_id: ResidencyId,
    pub group_id: GroupId,
    pub release: IntervalRelease,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedInterval {
    pub interval_id: ResidencyId,
    pub group_id: GroupId,
    pub budget_minutes: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedViolation {
    pub violation_id: ViolationId,
    pub violation: NewSlaViolation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentChangeOutcome {
    pub ticket_id: TicketId,
    pub from_group: Option<GroupId>,
    pub to_group: Option<GroupId>,
    pub closed: Option<ClosedInterval>,
    pub opened: Option<OpenedInterval>,
    pub violations: Vec<RecordedViolation>,
}

impl AssignmentChangeOutcome {
    fn unchanged(ticket_id: TicketId, group: Option<GroupId>) -> Self {
        Self {
            ticket_id,
            from_group: group,
            to_group: group,
            closed: None,
            opened: None,
            violations: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.closed.is_none() && self.opened.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClosureOutcome {
    pub ticket_id: TicketId,
    pub sla_id: Option<SlaId>,
    pub closed: Option<ClosedInterval>,
    pub violations: Vec<RecordedViolation>,
}

#[derive(Clone, Debug, Default)]
pub struct SlaEngine<C = SystemClock> {
    clock: C,
}

impl SlaEngine<SystemClock> {
    pub fn system() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C> SlaEngine<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Chooses the user who should work a ticket filed under the given
    /// classification, or `None` to leave it unassigned.
    pub async fn resolve_executor<S>(
        &self,
        store: &mut S,
        ticket_service_id: Option<TicketServiceId>,
        service_ids: &[ServiceId],
    ) -> Result<Option<UserId>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let Some(ticket_service_id) = ticket_service_id else {
            return Ok(None);
        };

        for service_id in service_ids {
            let combo = ServiceCombo {
                ticket_service_id: Some(ticket_service_id),
                service_id: Some(*service_id),
            };

            if let Some(user_id) = store.find_direct_user(combo).await? {
                info!(
                    event_name = "routing.executor.resolved",
                    source = "direct",
                    ticket_service_id = ticket_service_id.0,
                    service_id = service_id.0,
                    user_id = user_id.0,
                    "executor resolved from direct mapping"
                );
                return Ok(Some(user_id));
            }

            let Some(group_id) = store.find_auto_assign_group(combo).await? else {
                continue;
            };
            let candidates = store.list_group_candidates(group_id).await?;
            if let Some(user_id) = pick_member(&candidates) {
                info!(
                    event_name = "routing.executor.resolved",
                    source = "group",
                    ticket_service_id = ticket_service_id.0,
                    service_id = service_id.0,
                    group_id = group_id.0,
                    user_id = user_id.0,
                    candidate_count = candidates.len(),
                    "executor resolved from group mapping"
                );
                return Ok(Some(user_id));
            }
        }

        info!(
            event_name = "routing.executor.unresolved",
            ticket_service_id = ticket_service_id.0,
            service_count = service_ids.len(),
            "no executor mapping matched"
        );
        Ok(None)
    }

    pub async fn resolve_sla<S>(
        &self,
        store: &mut S,
        ticket_service_id: Option<TicketServiceId>,
        service_ids: &[ServiceId],
    ) -> Result<Option<Sla>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let classification = ServiceClassification::new(ticket_service_id, service_ids.to_vec());
        self.resolve_sla_for(store, &classification).await
    }

    async fn resolve_sla_for<S>(
        &self,
        store: &mut S,
        classification: &ServiceClassification,
    ) -> Result<Option<Sla>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        if classification.is_empty() {
            return Ok(None);
        }

        let mappings = store.list_sla_mappings(classification).await?;
        let Some(selected) = select_sla_mapping(&mappings, classification) else {
            return Ok(None);
        };
        let sla_id = selected.mapping.sla_id;
        let tier = selected.tier;

        let sla = store.find_sla(sla_id).await?;
        if sla.is_none() {
            warn!(
                event_name = "sla.mapping.dangling",
                sla_id = sla_id.0,
                mapping_id = selected.mapping.id,
                "sla mapping points at a missing sla"
            );
        } else {
            debug!(
                event_name = "sla.resolved",
                sla_id = sla_id.0,
                tier = tier.as_str(),
                "sla resolved"
            );
        }
        Ok(sla)
    }

    async fn ticket_sla<S>(
        &self,
        store: &mut S,
        ticket: Option<&TicketSnapshot>,
    ) -> Result<Option<Sla>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        match ticket {
            Some(ticket) => self.resolve_sla_for(store, &ticket.classification).await,
            None => Ok(None),
        }
    }

    /// Resolves the group that owns a user's work.
    pub async fn group_of<S>(
        &self,
        store: &mut S,
        user_id: Option<UserId>,
    ) -> Result<Option<GroupId>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        let memberships = store.list_user_memberships(user_id).await?;
        Ok(primary_group(&memberships))
    }

    pub async fn track_assignment_change<S>(
        &self,
        store: &mut S,
        ticket_id: TicketId,
        old_assignee: Option<UserId>,
        new_assignee: Option<UserId>,
        changed_by: Option<UserId>,
    ) -> Result<AssignmentChangeOutcome, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        if old_assignee == new_assignee {
            let group = self.group_of(store, new_assignee).await?;
            return Ok(AssignmentChangeOutcome::unchanged(ticket_id, group));
        }

        // Lock before the first read so the whole change runs as a writer.
        store.lock_ticket(ticket_id).await?;
        let from_group = self.group_of(store, old_assignee).await?;
        let to_group = self.group_of(store, new_assignee).await?;
        let ResidencyTransition::Move { from, to } = residency::plan_transition(from_group, to_group)
        else {
            return Ok(AssignmentChangeOutcome::unchanged(ticket_id, to_group));
        };

        let ticket = store.find_ticket(ticket_id).await?;
        let sla = self.ticket_sla(store, ticket.as_ref()).await?;
        let now = self.clock.now();

        let mut violations = Vec::new();
        let active = self.single_active_interval(store, ticket_id).await?;
        let closed = match active {
            Some(entry) => {
                if from.is_none() {
                    warn!(
                        event_name = "sla.residency.drift",
                        ticket_id = ticket_id.0,
                        group_id = entry.executor_group_id.0,
                        "closing an active interval the previous assignee does not account for"
                    );
                }
                let sla_id = sla.as_ref().map(|sla| sla.id);
                Some(self.close_interval(store, entry, sla_id, now, &mut violations).await?)
            }
            None => None,
        };

        let opened = match to {
            Some(group_id) => Some(
                self.open_interval(store, ticket_id, group_id, sla.as_ref(), changed_by, now)
                    .await?,
            ),
            None => None,
        };

        Ok(AssignmentChangeOutcome { ticket_id, from_group: from, to_group: to, closed, opened, violations })
    }

    pub async fn track_ticket_closed<S>(
        &self,
        store: &mut S,
        ticket_id: TicketId,
        closed_by: Option<UserId>,
    ) -> Result<TicketClosureOutcome, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        store.lock_ticket(ticket_id).await?;
        let ticket = store.find_ticket(ticket_id).await?;
        let sla = self.ticket_sla(store, ticket.as_ref()).await?;
        let now = self.clock.now();

        let mut violations = Vec::new();
        let closed = match self.single_active_interval(store, ticket_id).await? {
            Some(entry) => {
                let sla_id = sla.as_ref().map(|sla| sla.id);
                Some(self.close_interval(store, entry, sla_id, now, &mut violations).await?)
            }
            None => None,
        };

        if let (Some(ticket), Some(sla)) = (ticket.as_ref(), sla.as_ref()) {
            for violation in residency::global_violations(ticket, sla, now) {
                violations.push(self.record_violation(store, violation).await?);
            }
        }

        info!(
            event_name = "sla.ticket.closed",
            ticket_id = ticket_id.0,
            closed_by = closed_by.map(|user| user.0),
            sla_id = sla.as_ref().map(|sla| sla.id.0),
            violation_count = violations.len(),
            "ticket closure tracked"
        );

        Ok(TicketClosureOutcome { ticket_id, sla_id: sla.map(|sla| sla.id), closed, violations })
    }

    async fn single_active_interval<S>(
        &self,
        store: &mut S,
        ticket_id: TicketId,
    ) -> Result<Option<TicketGroupLogEntry>, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let mut active = store.list_active_intervals(ticket_id).await?;
        if active.len() > 1 {
            error!(
                event_name = "sla.residency.invariant_violation",
                ticket_id = ticket_id.0,
                active_count = active.len(),
                "ticket has more than one active residency interval"
            );
            return Err(DomainError::MultipleActiveIntervals { ticket_id, count: active.len() }
                .into());
        }
        Ok(active.pop())
    }

    async fn close_interval<S>(
        &self,
        store: &mut S,
        entry: TicketGroupLogEntry,
        sla_id: Option<SlaId>,
        now: DateTime<Utc>,
        violations: &mut Vec<RecordedViolation>,
    ) -> Result<ClosedInterval, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let release = residency::release_interval(&entry, now);
        store.release_interval(entry.id, &release).await?;

        info!(
            event_name = "sla.residency.closed",
            ticket_id = entry.ticket_id.0,
            group_id = entry.executor_group_id.0,
            interval_id = entry.id.0,
            time_spent_minutes = release.time_spent_minutes,
            overdue_minutes = release.overdue_minutes,
            "residency interval closed"
        );

        if let Some(violation) = residency::group_violation(&entry, &release, sla_id) {
            violations.push(self.record_violation(store, violation).await?);
        }

        Ok(ClosedInterval { interval_id: entry.id, group_id: entry.executor_group_id, release })
    }

    async fn open_interval<S>(
        &self,
        store: &mut S,
        ticket_id: TicketId,
        group_id: GroupId,
        sla: Option<&Sla>,
        assigned_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<OpenedInterval, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let budget_minutes = match sla {
            Some(sla) => store
                .find_group_budget(sla.id, group_id)
                .await?
                .and_then(|budget| budget.resolution_minutes),
            None => None,
        };

        let interval = NewResidencyInterval {
            ticket_id,
            executor_group_id: group_id,
            assigned_at: now,
            budget_minutes,
            assigned_by,
        };
        let interval_id = store.insert_interval(&interval).await?;

        info!(
            event_name = "sla.residency.opened",
            ticket_id = ticket_id.0,
            group_id = group_id.0,
            interval_id = interval_id.0,
            budget_minutes,
            "residency interval opened"
        );

        Ok(OpenedInterval { interval_id, group_id, budget_minutes })
    }

    async fn record_violation<S>(
        &self,
        store: &mut S,
        violation: NewSlaViolation,
    ) -> Result<RecordedViolation, ApplicationError>
    where
        S: EngineStore + ?Sized,
    {
        let violation_id = store.append_violation(&violation).await?;
        warn!(
            event_name = "sla.violation.recorded",
            ticket_id = violation.ticket_id.0,
            violation_type = violation.violation_type.as_str(),
            group_id = violation.executor_group_id.map(|group| group.0),
            sla_id = violation.sla_id.map(|sla| sla.0),
            overdue_minutes = violation.overdue_minutes,
            "sla violation recorded"
        );
        Ok(RecordedViolation { violation_id, violation })
    }
}
