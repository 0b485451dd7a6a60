use sqlx::{Executor, QueryBuilder, Sqlite};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_USER_IDS: &[i64] = &[1, 2, 3, 4, 5];
const SEED_STATUS_IDS: &[i64] = &[1, 2, 3, 4];
const SEED_GROUP_IDS: &[i64] = &[1, 2, 3];
const SEED_SLA_IDS: &[i64] = &[1, 2];
const SEED_TICKET_IDS: &[i64] = &[1, 2, 3];

/// Tickets the dataset describes, with the residency each one starts in.
const SEED_TICKETS: &[SeedTicketContract] = &[
    SeedTicketContract {
        ticket_id: 1,
        status_id: 2,
        active_group_id: Some(1),
        description: "Critical SLA, L1 Support active with a 30 minute budget",
    },
    SeedTicketContract {
        ticket_id: 2,
        status_id: 3,
        active_group_id: Some(1),
        description: "Standard SLA, awaiting confirmation since 2026-02-19",
    },
    SeedTicketContract {
        ticket_id: 3,
        status_id: 1,
        active_group_id: None,
        description: "Unclassified and unassigned",
    },
];

/// Canonical helpdesk dataset for end-to-end runs and CLI smoke checks.
pub struct HelpdeskSeedDataset;

impl HelpdeskSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/helpdesk_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let tickets_seeded = SEED_TICKETS
            .iter()
            .map(|ticket| TicketSeedInfo {
                ticket_id: ticket.ticket_id,
                description: ticket.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { tickets_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        checks.push((
            "users",
            count_ids(pool, "users", SEED_USER_IDS).await? == SEED_USER_IDS.len(),
        ));
        checks.push((
            "ticket-statuses",
            count_ids(pool, "ticket_statuses", SEED_STATUS_IDS).await? == SEED_STATUS_IDS.len(),
        ));
        checks.push((
            "executor-groups",
            count_ids(pool, "executor_groups", SEED_GROUP_IDS).await? == SEED_GROUP_IDS.len(),
        ));
        checks.push(("sla", count_ids(pool, "sla", SEED_SLA_IDS).await? == SEED_SLA_IDS.len()));

        let budgets: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM sla_group_budgets WHERE sla_id IN (1, 2)")
                .fetch_one(pool)
                .await?;
        checks.push(("sla-group-budgets", budgets == 4));

        for ticket in SEED_TICKETS {
            let status_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM tickets WHERE id = ?1 AND status_id = ?2)",
            )
            .bind(ticket.ticket_id)
            .bind(ticket.status_id)
            .fetch_one(pool)
            .await?;
            checks.push((ticket.status_label(), status_ok == 1));

            let active_groups: Vec<i64> = sqlx::query_scalar(
                "SELECT executor_group_id FROM ticket_group_log
                 WHERE ticket_id = ?1 AND released_at IS NULL",
            )
            .bind(ticket.ticket_id)
            .fetch_all(pool)
            .await?;
            let expected = ticket.active_group_id.into_iter().collect::<Vec<_>>();
            checks.push((ticket.residency_label(), active_groups == expected));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows along with anything recorded against the
    /// seeded tickets since they were loaded.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for (table, column, ids) in [
            ("sla_violations", "ticket_id", SEED_TICKET_IDS),
            ("ticket_group_log", "ticket_id", SEED_TICKET_IDS),
            ("ticket_services", "ticket_id", SEED_TICKET_IDS),
            ("tickets", "id", SEED_TICKET_IDS),
            ("sla_service_mappings", "sla_id", SEED_SLA_IDS),
            ("sla_group_budgets", "sla_id", SEED_SLA_IDS),
            ("sla", "id", SEED_SLA_IDS),
            ("executor_group_service_mappings", "group_id", SEED_GROUP_IDS),
            ("executor_user_service_mappings", "user_id", SEED_USER_IDS),
            ("executor_group_members", "group_id", SEED_GROUP_IDS),
            ("executor_groups", "id", SEED_GROUP_IDS),
            ("ticket_statuses", "id", SEED_STATUS_IDS),
            ("users", "id", SEED_USER_IDS),
        ] {
            let mut query_builder =
                QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE {column} IN ("));
            push_id_list(&mut query_builder, ids);
            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTicketContract {
    ticket_id: i64,
    status_id: i64,
    active_group_id: Option<i64>,
    description: &'static str,
}

impl SeedTicketContract {
    fn status_label(&self) -> &'static str {
        match self.ticket_id {
            1 => "ticket-1-status",
            2 => "ticket-2-status",
            _ => "ticket-3-status",
        }
    }

    fn residency_label(&self) -> &'static str {
        match self.ticket_id {
            1 => "ticket-1-residency",
            2 => "ticket-2-residency",
            _ => "ticket-3-residency",
        }
    }
}

async fn count_ids(pool: &DbPool, table: &str, ids: &[i64]) -> Result<usize, RepositoryError> {
    let mut query_builder =
        QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(1) FROM {table} WHERE id IN ("));
    push_id_list(&mut query_builder, ids);
    let count: i64 = query_builder.build_query_scalar().fetch_one(pool).await?;
    usize::try_from(count)
        .map_err(|_| RepositoryError::Decode(format!("negative count for `{table}`")))
}

fn push_id_list(query_builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = query_builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    query_builder.push(")");
}

#[derive(Debug)]
pub struct SeedResult {
    pub tickets_seeded: Vec<TicketSeedInfo>,
}

#[derive(Debug)]
pub struct TicketSeedInfo {
    pub ticket_id: i64,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!HelpdeskSeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = HelpdeskSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            HelpdeskSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.tickets_seeded.len(), 3);

        HelpdeskSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            HelpdeskSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        HelpdeskSeedDataset::load(&pool).await.expect("load seed fixtures");
        HelpdeskSeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = HelpdeskSeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);

        let remaining_tickets: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM tickets")
            .fetch_one(&pool)
            .await
            .expect("count tickets");
        assert_eq!(remaining_tickets, 0);
    }
}
