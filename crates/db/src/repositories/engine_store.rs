use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use routedesk_core::domain::group::{GroupId, MemberCandidate, Membership, UserId};
use routedesk_core::domain::residency::{
    IntervalRelease, NewResidencyInterval, ResidencyId, TicketGroupLogEntry,
};
use routedesk_core::domain::service::{
    ServiceClassification, ServiceCombo, ServiceId, TicketServiceId,
};
use routedesk_core::domain::sla::{Sla, SlaGroupBudget, SlaId, SlaMapping};
use routedesk_core::domain::ticket::{StatusId, TicketId, TicketSnapshot};
use routedesk_core::domain::violation::{NewSlaViolation, ViolationId};
use routedesk_core::engine::EngineStore;
use routedesk_core::errors::ApplicationError;

use super::{
    format_timestamp, parse_bool_flag, parse_optional_timestamp, parse_timestamp, parse_u32,
    RepositoryError,
};

/// Engine storage bound to one connection, normally a transaction owned by
/// the caller. Nothing here commits. A deferred transaction that reads before
/// its first write can fail with `SQLITE_BUSY` under contention; callers that
/// mutate should open it with [`crate::begin_immediate`].
pub struct SqlEngineStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqlEngineStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// A no-op write on the ticket row. In SQLite this takes the database
    /// write lock, which is held until the surrounding transaction ends.
    pub async fn touch_ticket(&mut self, ticket_id: TicketId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE tickets SET id = id WHERE id = ?")
            .bind(ticket_id.0)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn ticket_snapshot(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status_id, ticket_service_id, assigned_to, created_at, due_date,
                    response_due_date, has_response
             FROM tickets
             WHERE id = ?",
        )
        .bind(ticket_id.0)
        .fetch_optional(&mut *self.conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let service_ids = sqlx::query_scalar::<_, i64>(
            "SELECT service_id FROM ticket_services WHERE ticket_id = ? ORDER BY position, service_id",
        )
        .bind(ticket_id.0)
        .fetch_all(&mut *self.conn)
        .await?
        .into_iter()
        .map(ServiceId)
        .collect();

        ticket_from_row(row, service_ids).map(Some)
    }

    pub async fn direct_user_for(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<UserId>, RepositoryError> {
        let user_id = sqlx::query_scalar::<_, i64>(
            "SELECT m.user_id
             FROM executor_user_service_mappings m
             JOIN users u ON u.id = m.user_id AND u.is_active = 1
             WHERE m.ticket_service_id IS ? AND m.service_id IS ?
             ORDER BY m.id
             LIMIT 1",
        )
        .bind(combo.ticket_service_id.map(|id| id.0))
        .bind(combo.service_id.map(|id| id.0))
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(user_id.map(UserId))
    }

    pub async fn auto_assign_group_for(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<GroupId>, RepositoryError> {
        let group_id = sqlx::query_scalar::<_, i64>(
            "SELECT m.group_id
             FROM executor_group_service_mappings m
             JOIN executor_groups g ON g.id = m.group_id AND g.is_active = 1 AND g.auto_assign = 1
             WHERE m.ticket_service_id IS ? AND m.service_id IS ?
             ORDER BY m.id
             LIMIT 1",
        )
        .bind(combo.ticket_service_id.map(|id| id.0))
        .bind(combo.service_id.map(|id| id.0))
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(group_id.map(GroupId))
    }

    pub async fn group_candidates(
        &mut self,
        group_id: GroupId,
    ) -> Result<Vec<MemberCandidate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT m.user_id,
                    m.is_lead,
                    (SELECT COUNT(*)
                       FROM tickets t
                       JOIN ticket_statuses s ON s.id = t.status_id AND s.is_open = 1
                      WHERE t.assigned_to = m.user_id) AS open_ticket_count
             FROM executor_group_members m
             JOIN users u ON u.id = m.user_id AND u.is_active = 1
             WHERE m.group_id = ?
             ORDER BY m.user_id",
        )
        .bind(group_id.0)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(candidate_from_row).collect()
    }

    pub async fn memberships_of(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<Membership>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT m.group_id, m.is_lead, m.joined_at
             FROM executor_group_members m
             JOIN executor_groups g ON g.id = m.group_id AND g.is_active = 1
             WHERE m.user_id = ?
             ORDER BY m.group_id",
        )
        .bind(user_id.0)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(membership_from_row).collect()
    }

    /// Mappings whose ticket service equals the classification's, or whose
    /// service is one of the classification's services. The ranking itself
    /// happens in the engine.
    pub async fn candidate_sla_mappings(
        &mut self,
        classification: &ServiceClassification,
    ) -> Result<Vec<SlaMapping>, RepositoryError> {
        if classification.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, sla_id, ticket_service_id, service_id FROM sla_service_mappings WHERE ",
        );

        if let Some(ticket_service_id) = classification.ticket_service_id {
            query_builder.push("ticket_service_id = ");
            query_builder.push_bind(ticket_service_id.0);
        }

        if !classification.service_ids.is_empty() {
            if classification.ticket_service_id.is_some() {
                query_builder.push(" OR ");
            }
            query_builder.push("service_id IN (");
            let mut separated = query_builder.separated(", ");
            for service_id in &classification.service_ids {
                separated.push_bind(service_id.0);
            }
            query_builder.push(")");
        }

        query_builder.push(" ORDER BY id");

        let rows = query_builder.build().fetch_all(&mut *self.conn).await?;
        rows.into_iter().map(sla_mapping_from_row).collect()
    }

    pub async fn sla_by_id(&mut self, sla_id: SlaId) -> Result<Option<Sla>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, response_time_minutes, response_notification_minutes,
                    resolution_time_minutes, resolution_notification_minutes,
                    no_response_minutes, no_response_status_id
             FROM sla
             WHERE id = ?",
        )
        .bind(sla_id.0)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(sla_from_row).transpose()
    }

    pub async fn group_budget(
        &mut self,
        sla_id: SlaId,
        group_id: GroupId,
    ) -> Result<Option<SlaGroupBudget>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sla_id, executor_group_id, resolution_minutes, response_minutes, sort_order
             FROM sla_group_budgets
             WHERE sla_id = ? AND executor_group_id = ?",
        )
        .bind(sla_id.0)
        .bind(group_id.0)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(budget_from_row).transpose()
    }

    pub async fn active_intervals(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketGroupLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, executor_group_id, assigned_at, released_at, budget_minutes,
                    time_spent_minutes, overdue_minutes, assigned_by
             FROM ticket_group_log
             WHERE ticket_id = ? AND released_at IS NULL
             ORDER BY assigned_at DESC, id DESC",
        )
        .bind(ticket_id.0)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(log_entry_from_row).collect()
    }

    pub async fn insert_log_entry(
        &mut self,
        interval: &NewResidencyInterval,
    ) -> Result<ResidencyId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO ticket_group_log
                (ticket_id, executor_group_id, assigned_at, budget_minutes, assigned_by)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(interval.ticket_id.0)
        .bind(interval.executor_group_id.0)
        .bind(format_timestamp(interval.assigned_at))
        .bind(interval.budget_minutes)
        .bind(interval.assigned_by.map(|user| user.0))
        .execute(&mut *self.conn)
        .await?;

        Ok(ResidencyId(result.last_insert_rowid()))
    }

    pub async fn release_log_entry(
        &mut self,
        id: ResidencyId,
        release: &IntervalRelease,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE ticket_group_log
             SET released_at = ?, time_spent_minutes = ?, overdue_minutes = ?
             WHERE id = ? AND released_at IS NULL",
        )
        .bind(format_timestamp(release.released_at))
        .bind(release.time_spent_minutes)
        .bind(release.overdue_minutes)
        .bind(id.0)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::Decode(format!(
                "residency interval {} is not active and cannot be released",
                id.0
            )));
        }
        Ok(())
    }

    pub async fn insert_violation(
        &mut self,
        violation: &NewSlaViolation,
    ) -> Result<ViolationId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO sla_violations
                (ticket_id, violation_type, executor_group_id, budget_minutes, actual_minutes,
                 overdue_minutes, sla_id, violated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(violation.ticket_id.0)
        .bind(violation.violation_type.as_str())
        .bind(violation.executor_group_id.map(|group| group.0))
        .bind(violation.budget_minutes)
        .bind(violation.actual_minutes)
        .bind(violation.overdue_minutes)
        .bind(violation.sla_id.map(|sla| sla.0))
        .bind(format_timestamp(violation.violated_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(ViolationId(result.last_insert_rowid()))
    }
}

#[async_trait]
impl<'c> EngineStore for SqlEngineStore<'c> {
    async fn lock_ticket(&mut self, ticket_id: TicketId) -> Result<(), ApplicationError> {
        Ok(self.touch_ticket(ticket_id).await?)
    }

    async fn find_ticket(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketSnapshot>, ApplicationError> {
        Ok(self.ticket_snapshot(ticket_id).await?)
    }

    async fn find_direct_user(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<UserId>, ApplicationError> {
        Ok(self.direct_user_for(combo).await?)
    }

    async fn find_auto_assign_group(
        &mut self,
        combo: ServiceCombo,
    ) -> Result<Option<GroupId>, ApplicationError> {
        Ok(self.auto_assign_group_for(combo).await?)
    }

    async fn list_group_candidates(
        &mut self,
        group_id: GroupId,
    ) -> Result<Vec<MemberCandidate>, ApplicationError> {
        Ok(self.group_candidates(group_id).await?)
    }

    async fn list_user_memberships(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<Membership>, ApplicationError> {
        Ok(self.memberships_of(user_id).await?)
    }

    async fn list_sla_mappings(
        &mut self,
        classification: &ServiceClassification,
    ) -> Result<Vec<SlaMapping>, ApplicationError> {
        Ok(self.candidate_sla_mappings(classification).await?)
    }

    async fn find_sla(&mut self, sla_id: SlaId) -> Result<Option<Sla>, ApplicationError> {
        Ok(self.sla_by_id(sla_id).await?)
    }

    async fn find_group_budget(
        &mut self,
        sla_id: SlaId,
        group_id: GroupId,
    ) -> Result<Option<SlaGroupBudget>, ApplicationError> {
        Ok(self.group_budget(sla_id, group_id).await?)
    }

    async fn list_active_intervals(
        &mut self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketGroupLogEntry>, ApplicationError> {
        Ok(self.active_intervals(ticket_id).await?)
    }

    async fn insert_interval(
        &mut self,
        interval: &NewResidencyInterval,
    ) -> Result<ResidencyId, ApplicationError> {
        Ok(self.insert_log_entry(interval).await?)
    }

    async fn release_interval(
        &mut self,
        id: ResidencyId,
        release: &IntervalRelease,
    ) -> Result<(), ApplicationError> {
        Ok(self.release_log_entry(id, release).await?)
    }

    async fn append_violation(
        &mut self,
        violation: &NewSlaViolation,
    ) -> Result<ViolationId, ApplicationError> {
        Ok(self.insert_violation(violation).await?)
    }
}

fn ticket_from_row(
    row: SqliteRow,
    service_ids: Vec<ServiceId>,
) -> Result<TicketSnapshot, RepositoryError> {
    Ok(TicketSnapshot {
        id: TicketId(row.try_get("id")?),
        status_id: StatusId(row.try_get("status_id")?),
        assigned_to: row.try_get::<Option<i64>, _>("assigned_to")?.map(UserId),
        classification: ServiceClassification::new(
            row.try_get::<Option<i64>, _>("ticket_service_id")?.map(TicketServiceId),
            service_ids,
        ),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        due_date: parse_optional_timestamp("due_date", row.try_get("due_date")?)?,
        response_due_date: parse_optional_timestamp(
            "response_due_date",
            row.try_get("response_due_date")?,
        )?,
        has_response: parse_bool_flag("has_response", row.try_get("has_response")?)?,
    })
}

fn candidate_from_row(row: SqliteRow) -> Result<MemberCandidate, RepositoryError> {
    Ok(MemberCandidate {
        user_id: UserId(row.try_get("user_id")?),
        is_lead: parse_bool_flag("is_lead", row.try_get("is_lead")?)?,
        open_ticket_count: parse_u32("open_ticket_count", row.try_get("open_ticket_count")?)?,
    })
}

fn membership_from_row(row: SqliteRow) -> Result<Membership, RepositoryError> {
    Ok(Membership {
        group_id: GroupId(row.try_get("group_id")?),
        is_lead: parse_bool_flag("is_lead", row.try_get("is_lead")?)?,
        joined_at: parse_timestamp("joined_at", row.try_get("joined_at")?)?,
    })
}

fn budget_from_row(row: SqliteRow) -> Result<SlaGroupBudget, RepositoryError> {
    Ok(SlaGroupBudget {
        sla_id: SlaId(row.try_get("sla_id")?),
        executor_group_id: GroupId(row.try_get("executor_group_id")?),
        resolution_minutes: row.try_get("resolution_minutes")?,
        response_minutes: row.try_get("response_minutes")?,
        sort_order: row.try_get("sort_order")?,
    })
}

fn sla_mapping_from_row(row: SqliteRow) -> Result<SlaMapping, RepositoryError> {
    Ok(SlaMapping {
        id: row.try_get("id")?,
        sla_id: SlaId(row.try_get("sla_id")?),
        ticket_service_id: row.try_get::<Option<i64>, _>("ticket_service_id")?.map(TicketServiceId),
        service_id: row.try_get::<Option<i64>, _>("service_id")?.map(ServiceId),
    })
}

fn sla_from_row(row: SqliteRow) -> Result<Sla, RepositoryError> {
    Ok(Sla {
        id: SlaId(row.try_get("id")?),
        name: row.try_get("name")?,
        response_time_minutes: row.try_get("response_time_minutes")?,
        response_notification_minutes: row.try_get("response_notification_minutes")?,
        resolution_time_minutes: row.try_get("resolution_time_minutes")?,
        resolution_notification_minutes: row.try_get("resolution_notification_minutes")?,
        no_response_minutes: row.try_get("no_response_minutes")?,
        no_response_status_id: row.try_get("no_response_status_id")?,
    })
}

pub(crate) fn log_entry_from_row(row: SqliteRow) -> Result<TicketGroupLogEntry, RepositoryError> {
    Ok(TicketGroupLogEntry {
        id: ResidencyId(row.try_get("id")?),
        ticket_id: TicketId(row.try_get("ticket_id")?),
        executor_group_id: GroupId(row.try_get("executor_group_id")?),
        assigned_at: parse_timestamp("assigned_at", row.try_get("assigned_at")?)?,
        released_at: parse_optional_timestamp("released_at", row.try_get("released_at")?)?,
        budget_minutes: row.try_get("budget_minutes")?,
        time_spent_minutes: row.try_get("time_spent_minutes")?,
        overdue_minutes: row.try_get("overdue_minutes")?,
        assigned_by: row.try_get::<Option<i64>, _>("assigned_by")?.map(UserId),
    })
}
