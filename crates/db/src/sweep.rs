//! Closes tickets whose requester never answered the confirmation request.

use routedesk_core::chrono::{DateTime, Duration, Utc};
use routedesk_core::config::SweepConfig;
use routedesk_core::domain::ticket::{StatusId, TicketId};
use routedesk_core::engine::{Clock, SlaEngine};
use routedesk_core::errors::ApplicationError;
use serde::Serialize;
use tracing::{info, warn};

use crate::repositories::{format_timestamp, RepositoryError, SqlEngineStore};
use crate::service::new_correlation_id;
use crate::{begin_immediate, DbPool};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub ticket_id: TicketId,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub correlation_id: String,
    pub started_at: DateTime<Utc>,
    pub cutoff: DateTime<Utc>,
    pub candidates: u32,
    pub closed_tickets: Vec<TicketId>,
    pub violations_recorded: u32,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn empty(correlation_id: String, started_at: DateTime<Utc>, cutoff: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            started_at,
            cutoff,
            candidates: 0,
            closed_tickets: Vec::new(),
            violations_recorded: 0,
            failures: Vec::new(),
        }
    }
}

/// One pass over tickets waiting on confirmation for longer than the grace
/// period. Each ticket is closed in its own transaction together with its
/// closure tracking; a failing ticket is reported and the pass continues.
pub async fn run_auto_close<C>(
    pool: &DbPool,
    engine: &SlaEngine<C>,
    config: &SweepConfig,
) -> Result<SweepReport, ApplicationError>
where
    C: Clock,
{
    let started_at = engine.clock().now();
    let cutoff = started_at - Duration::hours(i64::from(config.grace_period_hours));
    let mut report = SweepReport::empty(new_correlation_id(), started_at, cutoff);

    let (Some(pending_status), Some(closed_status)) = sweep_statuses(pool).await? else {
        warn!(
            event_name = "sla.sweep.statuses_missing",
            correlation_id = %report.correlation_id,
            "pending-confirmation or closed status is not configured; nothing to sweep"
        );
        return Ok(report);
    };

    let candidates: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM tickets
         WHERE status_id = ?
           AND confirmation_sent_at IS NOT NULL
           AND confirmation_sent_at < ?
         ORDER BY confirmation_sent_at, id
         LIMIT ?",
    )
    .bind(pending_status.0)
    .bind(format_timestamp(cutoff))
    .bind(i64::from(config.batch_limit))
    .fetch_all(pool)
    .await
    .map_err(RepositoryError::from)?;
    report.candidates = u32::try_from(candidates.len()).unwrap_or(u32::MAX);

    for ticket_id in candidates.into_iter().map(TicketId) {
        match close_one(pool, engine, ticket_id, pending_status, closed_status, config).await {
            Ok(Some(violation_count)) => {
                report.closed_tickets.push(ticket_id);
                report.violations_recorded += violation_count;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    event_name = "sla.sweep.ticket_failed",
                    correlation_id = %report.correlation_id,
                    ticket_id = ticket_id.0,
                    error = %error,
                    "auto-close failed for ticket"
                );
                report.failures.push(SweepFailure { ticket_id, message: error.to_string() });
            }
        }
    }

    info!(
        event_name = "sla.sweep.completed",
        correlation_id = %report.correlation_id,
        candidates = report.candidates,
        closed = report.closed_tickets.len(),
        failed = report.failures.len(),
        violations = report.violations_recorded,
        "auto-close sweep completed"
    );

    Ok(report)
}

async fn sweep_statuses(
    pool: &DbPool,
) -> Result<(Option<StatusId>, Option<StatusId>), RepositoryError> {
    let pending: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM ticket_statuses WHERE is_pending_confirmation = 1 ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    let closed: Option<i64> =
        sqlx::query_scalar("SELECT id FROM ticket_statuses WHERE is_closed = 1 ORDER BY id LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok((pending.map(StatusId), closed.map(StatusId)))
}

/// `Ok(None)` when the ticket left the pending status before this
/// transaction got to it.
async fn close_one<C>(
    pool: &DbPool,
    engine: &SlaEngine<C>,
    ticket_id: TicketId,
    pending_status: StatusId,
    closed_status: StatusId,
    config: &SweepConfig,
) -> Result<Option<u32>, ApplicationError>
where
    C: Clock,
{
    let now = format_timestamp(engine.clock().now());
    let mut tx = begin_immediate(pool).await.map_err(RepositoryError::from)?;

    let updated = sqlx::query(
        "UPDATE tickets
         SET status_id = ?, rating = ?, closed_at = ?, updated_at = ?
         WHERE id = ? AND status_id = ?",
    )
    .bind(closed_status.0)
    .bind(i64::from(config.auto_rating))
    .bind(&now)
    .bind(&now)
    .bind(ticket_id.0)
    .bind(pending_status.0)
    .execute(&mut *tx)
    .await
    .map_err(RepositoryError::from)?;

    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    let outcome = {
        let mut store = SqlEngineStore::new(&mut *tx);
        engine.track_ticket_closed(&mut store, ticket_id, None).await?
    };
    tx.commit().await.map_err(RepositoryError::from)?;

    Ok(Some(u32::try_from(outcome.violations.len()).unwrap_or(u32::MAX)))
}
