use routedesk_core::domain::group::UserId;
use routedesk_core::domain::service::{ServiceId, TicketServiceId};
use routedesk_core::domain::sla::Sla;
use routedesk_core::domain::ticket::TicketId;
use routedesk_core::engine::{
    AssignmentChangeOutcome, Clock, SlaEngine, SystemClock, TicketClosureOutcome,
};
use routedesk_core::errors::ApplicationError;
use sqlx::Row;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::repositories::{format_timestamp, RepositoryError, SqlEngineStore};
use crate::{begin_immediate, DbPool};

/// Pool-owning front for [`SlaEngine`]. Every mutating call runs in its own
/// transaction, committed only when the engine succeeds.
#[derive(Clone, Debug)]
pub struct SlaService<C = SystemClock> {
    pool: DbPool,
    engine: SlaEngine<C>,
}

impl SlaService<SystemClock> {
    pub fn system(pool: DbPool) -> Self {
        Self::new(pool, SlaEngine::system())
    }
}

impl<C> SlaService<C>
where
    C: Clock,
{
    pub fn new(pool: DbPool, engine: SlaEngine<C>) -> Self {
        Self { pool, engine }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn engine(&self) -> &SlaEngine<C> {
        &self.engine
    }

    pub async fn resolve_executor(
        &self,
        ticket_service_id: Option<TicketServiceId>,
        service_ids: &[ServiceId],
    ) -> Result<Option<UserId>, ApplicationError> {
        let span = operation_span("resolve_executor");
        async {
            let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
            let mut store = SqlEngineStore::new(&mut *conn);
            self.engine.resolve_executor(&mut store, ticket_service_id, service_ids).await
        }
        .instrument(span)
        .await
    }

    pub async fn resolve_sla(
        &self,
        ticket_service_id: Option<TicketServiceId>,
        service_ids: &[ServiceId],
    ) -> Result<Option<Sla>, ApplicationError> {
        let span = operation_span("resolve_sla");
        async {
            let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
            let mut store = SqlEngineStore::new(&mut *conn);
            self.engine.resolve_sla(&mut store, ticket_service_id, service_ids).await
        }
        .instrument(span)
        .await
    }

    /// Records residency for an assignment change the caller has already
    /// persisted.
    pub async fn track_assignment_change(
        &self,
        ticket_id: TicketId,
        old_assignee: Option<UserId>,
        new_assignee: Option<UserId>,
        changed_by: Option<UserId>,
    ) -> Result<AssignmentChangeOutcome, ApplicationError> {
        let span = operation_span("track_assignment_change");
        async {
            let mut tx = begin_immediate(&self.pool).await.map_err(RepositoryError::from)?;
            let outcome = {
                let mut store = SqlEngineStore::new(&mut *tx);
                self.engine
                    .track_assignment_change(
                        &mut store,
                        ticket_id,
                        old_assignee,
                        new_assignee,
                        changed_by,
                    )
                    .await?
            };
            tx.commit().await.map_err(RepositoryError::from)?;
            Ok::<_, ApplicationError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Reassigns the ticket and tracks the residency change in one
    /// transaction. Returns `None` when the ticket does not exist.
    pub async fn reassign_ticket(
        &self,
        ticket_id: TicketId,
        new_assignee: Option<UserId>,
        changed_by: Option<UserId>,
    ) -> Result<Option<AssignmentChangeOutcome>, ApplicationError> {
        let span = operation_span("reassign_ticket");
        async {
            let mut tx = begin_immediate(&self.pool).await.map_err(RepositoryError::from)?;

            let current = sqlx::query("SELECT assigned_to FROM tickets WHERE id = ?")
                .bind(ticket_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
            let Some(current) = current else {
                return Ok(None);
            };
            let old_assignee = current
                .try_get::<Option<i64>, _>("assigned_to")
                .map_err(RepositoryError::from)?
                .map(UserId);

            sqlx::query("UPDATE tickets SET assigned_to = ?, updated_at = ? WHERE id = ?")
                .bind(new_assignee.map(|user| user.0))
                .bind(format_timestamp(self.engine.clock().now()))
                .bind(ticket_id.0)
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;

            let outcome = {
                let mut store = SqlEngineStore::new(&mut *tx);
                self.engine
                    .track_assignment_change(
                        &mut store,
                        ticket_id,
                        old_assignee,
                        new_assignee,
                        changed_by,
                    )
                    .await?
            };
            tx.commit().await.map_err(RepositoryError::from)?;
            Ok::<_, ApplicationError>(Some(outcome))
        }
        .instrument(span)
        .await
    }

    /// Records closure for a ticket the caller has already closed.
    pub async fn track_ticket_closed(
        &self,
        ticket_id: TicketId,
        closed_by: Option<UserId>,
    ) -> Result<TicketClosureOutcome, ApplicationError> {
        let span = operation_span("track_ticket_closed");
        async {
            let mut tx = begin_immediate(&self.pool).await.map_err(RepositoryError::from)?;
            let outcome = {
                let mut store = SqlEngineStore::new(&mut *tx);
                self.engine.track_ticket_closed(&mut store, ticket_id, closed_by).await?
            };
            tx.commit().await.map_err(RepositoryError::from)?;
            Ok::<_, ApplicationError>(outcome)
        }
        .instrument(span)
        .await
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn operation_span(operation: &'static str) -> tracing::Span {
    info_span!("sla_service", operation, correlation_id = %new_correlation_id())
}
