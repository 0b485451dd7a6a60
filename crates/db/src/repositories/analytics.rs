//! Read-only compliance reporting over the residency log and violations.

use routedesk_core::chrono::{DateTime, Utc};
use routedesk_core::domain::group::{GroupId, UserId};
use routedesk_core::domain::residency::TicketGroupLogEntry;
use routedesk_core::domain::sla::SlaId;
use routedesk_core::domain::ticket::TicketId;
use routedesk_core::domain::violation::{SlaViolation, ViolationId, ViolationType};
use routedesk_core::residency::elapsed_minutes;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use super::engine_store::log_entry_from_row;
use super::{
    format_timestamp, parse_bool_flag, parse_optional_timestamp, parse_timestamp, parse_u32,
    RepositoryError,
};
use crate::DbPool;

/// Optional inclusive bounds applied to the timestamp column each query
/// reports on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ReportWindow {
    fn push_filter(&self, query_builder: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        if let Some(from) = self.from {
            query_builder.push(format!(" AND {column} >= "));
            query_builder.push_bind(format_timestamp(from));
        }
        if let Some(to) = self.to {
            query_builder.push(format!(" AND {column} <= "));
            query_builder.push_bind(format_timestamp(to));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViolationTypeSummary {
    pub violation_type: ViolationType,
    pub count: u32,
    pub avg_overdue_minutes: i64,
    pub max_overdue_minutes: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupViolationSummary {
    pub group_id: GroupId,
    pub group_name: String,
    pub violation_count: u32,
    pub avg_overdue_minutes: i64,
    pub max_overdue_minutes: i64,
}

/// Released intervals only; an interval still running has no time spent yet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupPerformance {
    pub group_id: GroupId,
    pub group_name: String,
    pub total_assignments: u32,
    pub avg_time_minutes: i64,
    pub overdue_count: u32,
    pub overdue_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComplianceDashboard {
    pub window: ReportWindow,
    pub total_violations: u32,
    pub sla_compliance_percent: f64,
    pub total_tickets_with_sla: u32,
    pub violated_tickets: u32,
    pub by_type: Vec<ViolationTypeSummary>,
    pub by_group: Vec<GroupViolationSummary>,
    pub group_performance: Vec<GroupPerformance>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupLogRecord {
    #[serde(flatten)]
    pub entry: TicketGroupLogEntry,
    pub group_name: String,
    pub assigned_by_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketViolationRecord {
    #[serde(flatten)]
    pub violation: SlaViolation,
    pub group_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveGroup {
    pub group_id: GroupId,
    pub group_name: String,
    pub assigned_at: DateTime<Utc>,
    pub budget_minutes: Option<i64>,
    pub elapsed_minutes: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketSlaInfo {
    pub ticket_id: TicketId,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub response_due_date: Option<DateTime<Utc>>,
    pub has_response: bool,
    pub assigned_to: Option<UserId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub active_group: Option<ActiveGroup>,
    /// Newest first.
    pub violations: Vec<TicketViolationRecord>,
    pub has_violations: bool,
}

pub struct SqlComplianceAnalytics {
    pool: DbPool,
}

impl SqlComplianceAnalytics {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(
        &self,
        window: ReportWindow,
    ) -> Result<ComplianceDashboard, RepositoryError> {
        let by_type = self.violations_by_type(window).await?;
        let by_group = self.violations_by_group(window).await?;
        let group_performance = self.group_performance(window).await?;
        let total_violations = by_type.iter().map(|summary| summary.count).sum();

        let mut tickets_query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM tickets t WHERE t.due_date IS NOT NULL",
        );
        window.push_filter(&mut tickets_query, "t.created_at");
        let total_tickets_with_sla = parse_u32(
            "total_tickets_with_sla",
            tickets_query.build_query_scalar::<i64>().fetch_one(&self.pool).await?,
        )?;

        let mut violated_query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(DISTINCT ticket_id) FROM sla_violations
             WHERE violation_type IN ('global_resolution', 'global_response')",
        );
        window.push_filter(&mut violated_query, "violated_at");
        let violated_tickets = parse_u32(
            "violated_tickets",
            violated_query.build_query_scalar::<i64>().fetch_one(&self.pool).await?,
        )?;

        Ok(ComplianceDashboard {
            window,
            total_violations,
            sla_compliance_percent: compliance_percent(total_tickets_with_sla, violated_tickets),
            total_tickets_with_sla,
            violated_tickets,
            by_type,
            by_group,
            group_performance,
        })
    }

    async fn violations_by_type(
        &self,
        window: ReportWindow,
    ) -> Result<Vec<ViolationTypeSummary>, RepositoryError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT violation_type,
                    COUNT(*) AS count,
                    CAST(ROUND(AVG(overdue_minutes)) AS INTEGER) AS avg_overdue_minutes,
                    MAX(overdue_minutes) AS max_overdue_minutes
             FROM sla_violations
             WHERE 1=1",
        );
        window.push_filter(&mut query_builder, "violated_at");
        query_builder.push(" GROUP BY violation_type ORDER BY count DESC, violation_type");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<ViolationTypeSummary, RepositoryError> {
                Ok(ViolationTypeSummary {
                    violation_type: parse_violation_type(row.try_get("violation_type")?)?,
                    count: parse_u32("count", row.try_get("count")?)?,
                    avg_overdue_minutes: row.try_get("avg_overdue_minutes")?,
                    max_overdue_minutes: row.try_get("max_overdue_minutes")?,
                })
            })
            .collect()
    }

    async fn violations_by_group(
        &self,
        window: ReportWindow,
    ) -> Result<Vec<GroupViolationSummary>, RepositoryError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT sv.executor_group_id,
                    eg.name AS group_name,
                    COUNT(*) AS violation_count,
                    CAST(ROUND(AVG(sv.overdue_minutes)) AS INTEGER) AS avg_overdue_minutes,
                    MAX(sv.overdue_minutes) AS max_overdue_minutes
             FROM sla_violations sv
             JOIN executor_groups eg ON eg.id = sv.executor_group_id
             WHERE sv.executor_group_id IS NOT NULL",
        );
        window.push_filter(&mut query_builder, "sv.violated_at");
        query_builder.push(
            " GROUP BY sv.executor_group_id, eg.name
              ORDER BY violation_count DESC, sv.executor_group_id",
        );

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<GroupViolationSummary, RepositoryError> {
                Ok(GroupViolationSummary {
                    group_id: GroupId(row.try_get("executor_group_id")?),
                    group_name: row.try_get("group_name")?,
                    violation_count: parse_u32("violation_count", row.try_get("violation_count")?)?,
                    avg_overdue_minutes: row.try_get("avg_overdue_minutes")?,
                    max_overdue_minutes: row.try_get("max_overdue_minutes")?,
                })
            })
            .collect()
    }

    async fn group_performance(
        &self,
        window: ReportWindow,
    ) -> Result<Vec<GroupPerformance>, RepositoryError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT gl.executor_group_id,
                    eg.name AS group_name,
                    COUNT(*) AS total_assignments,
                    CAST(ROUND(AVG(gl.time_spent_minutes)) AS INTEGER) AS avg_time_minutes,
                    SUM(CASE WHEN gl.overdue_minutes > 0 THEN 1 ELSE 0 END) AS overdue_count,
                    ROUND(
                        100.0 * SUM(CASE WHEN gl.overdue_minutes > 0 THEN 1 ELSE 0 END) / COUNT(*),
                        1
                    ) AS overdue_percent
             FROM ticket_group_log gl
             JOIN executor_groups eg ON eg.id = gl.executor_group_id
             WHERE gl.released_at IS NOT NULL",
        );
        window.push_filter(&mut query_builder, "gl.assigned_at");
        query_builder.push(
            " GROUP BY gl.executor_group_id, eg.name
              ORDER BY total_assignments DESC, gl.executor_group_id",
        );

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<GroupPerformance, RepositoryError> {
                Ok(GroupPerformance {
                    group_id: GroupId(row.try_get("executor_group_id")?),
                    group_name: row.try_get("group_name")?,
                    total_assignments: parse_u32(
                        "total_assignments",
                        row.try_get("total_assignments")?,
                    )?,
                    avg_time_minutes: row.try_get("avg_time_minutes")?,
                    overdue_count: parse_u32("overdue_count", row.try_get("overdue_count")?)?,
                    overdue_percent: row.try_get("overdue_percent")?,
                })
            })
            .collect()
    }

    /// The ticket's residency intervals in assignment order.
    pub async fn ticket_group_log(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<GroupLogRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT gl.id, gl.ticket_id, gl.executor_group_id, gl.assigned_at, gl.released_at,
                    gl.budget_minutes, gl.time_spent_minutes, gl.overdue_minutes, gl.assigned_by,
                    eg.name AS group_name,
                    u.full_name AS assigned_by_name
             FROM ticket_group_log gl
             JOIN executor_groups eg ON eg.id = gl.executor_group_id
             LEFT JOIN users u ON u.id = gl.assigned_by
             WHERE gl.ticket_id = ?
             ORDER BY gl.assigned_at, gl.id",
        )
        .bind(ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<GroupLogRecord, RepositoryError> {
                let group_name = row.try_get("group_name")?;
                let assigned_by_name = row.try_get("assigned_by_name")?;
                Ok(GroupLogRecord { entry: log_entry_from_row(row)?, group_name, assigned_by_name })
            })
            .collect()
    }

    /// The ticket's violations in the order they were recorded.
    pub async fn ticket_violations(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketViolationRecord>, RepositoryError> {
        self.violations_for(ticket_id, false).await
    }

    pub async fn ticket_sla_info(
        &self,
        ticket_id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketSlaInfo>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, created_at, due_date, response_due_date, has_response, assigned_to,
                    closed_at
             FROM tickets
             WHERE id = ?",
        )
        .bind(ticket_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let active_row = sqlx::query(
            "SELECT gl.executor_group_id, eg.name AS group_name, gl.assigned_at, gl.budget_minutes
             FROM ticket_group_log gl
             JOIN executor_groups eg ON eg.id = gl.executor_group_id
             WHERE gl.ticket_id = ? AND gl.released_at IS NULL
             LIMIT 1",
        )
        .bind(ticket_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let active_group = active_row
            .map(|active| -> Result<ActiveGroup, RepositoryError> {
                let assigned_at = parse_timestamp("assigned_at", active.try_get("assigned_at")?)?;
                Ok(ActiveGroup {
                    group_id: GroupId(active.try_get("executor_group_id")?),
                    group_name: active.try_get("group_name")?,
                    assigned_at,
                    budget_minutes: active.try_get("budget_minutes")?,
                    elapsed_minutes: elapsed_minutes(assigned_at, now),
                })
            })
            .transpose()?;

        let violations = self.violations_for(ticket_id, true).await?;

        Ok(Some(TicketSlaInfo {
            ticket_id: TicketId(row.try_get("id")?),
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
            due_date: parse_optional_timestamp("due_date", row.try_get("due_date")?)?,
            response_due_date: parse_optional_timestamp(
                "response_due_date",
                row.try_get("response_due_date")?,
            )?,
            has_response: parse_bool_flag("has_response", row.try_get("has_response")?)?,
            assigned_to: row.try_get::<Option<i64>, _>("assigned_to")?.map(UserId),
            closed_at: parse_optional_timestamp("closed_at", row.try_get("closed_at")?)?,
            active_group,
            has_violations: !violations.is_empty(),
            violations,
        }))
    }

    async fn violations_for(
        &self,
        ticket_id: TicketId,
        newest_first: bool,
    ) -> Result<Vec<TicketViolationRecord>, RepositoryError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT sv.id, sv.ticket_id, sv.violation_type, sv.executor_group_id,
                    sv.budget_minutes, sv.actual_minutes, sv.overdue_minutes, sv.sla_id,
                    sv.violated_at,
                    eg.name AS group_name
             FROM sla_violations sv
             LEFT JOIN executor_groups eg ON eg.id = sv.executor_group_id
             WHERE sv.ticket_id = ",
        );
        query_builder.push_bind(ticket_id.0);
        query_builder.push(if newest_first {
            " ORDER BY sv.violated_at DESC, sv.id DESC"
        } else {
            " ORDER BY sv.violated_at, sv.id"
        });

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(violation_record_from_row).collect()
    }
}

fn compliance_percent(with_sla: u32, violated: u32) -> f64 {
    let compliant = f64::from(with_sla) - f64::from(violated);
    let percent = 100.0 * compliant / f64::from(with_sla.max(1));
    (percent * 10.0).round() / 10.0
}

fn parse_violation_type(value: String) -> Result<ViolationType, RepositoryError> {
    ViolationType::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown violation type `{value}`")))
}

fn violation_record_from_row(row: SqliteRow) -> Result<TicketViolationRecord, RepositoryError> {
    Ok(TicketViolationRecord {
        violation: SlaViolation {
            id: ViolationId(row.try_get("id")?),
            ticket_id: TicketId(row.try_get("ticket_id")?),
            violation_type: parse_violation_type(row.try_get("violation_type")?)?,
            executor_group_id: row.try_get::<Option<i64>, _>("executor_group_id")?.map(GroupId),
            budget_minutes: row.try_get("budget_minutes")?,
            actual_minutes: row.try_get("actual_minutes")?,
            overdue_minutes: row.try_get("overdue_minutes")?,
            sla_id: row.try_get::<Option<i64>, _>("sla_id")?.map(SlaId),
            violated_at: parse_timestamp("violated_at", row.try_get("violated_at")?)?,
        },
        group_name: row.try_get("group_name")?,
    })
}
