use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "users",
        "ticket_statuses",
        "tickets",
        "ticket_services",
        "executor_groups",
        "executor_group_members",
        "executor_user_service_mappings",
        "executor_group_service_mappings",
        "sla",
        "sla_service_mappings",
        "sla_group_budgets",
        "ticket_group_log",
        "sla_violations",
        "idx_tickets_assigned_to",
        "idx_tickets_status_id",
        "idx_executor_group_members_user_id",
        "idx_executor_user_service_mappings_combo",
        "idx_executor_group_service_mappings_combo",
        "idx_sla_service_mappings_ticket_service",
        "idx_sla_service_mappings_service",
        "idx_ticket_group_log_ticket_id",
        "idx_ticket_group_log_group_id",
        "idx_ticket_group_log_single_active",
        "idx_sla_violations_ticket_id",
        "idx_sla_violations_violated_at",
    ];

    const ENGINE_TABLES: &[&str] = &[
        "executor_groups",
        "executor_group_members",
        "sla",
        "sla_service_mappings",
        "sla_group_budgets",
        "ticket_group_log",
        "sla_violations",
    ];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ENGINE_TABLES {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(*table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "table `{table}` should exist after migrations");
        }
    }

    #[tokio::test]
    async fn single_active_interval_is_enforced_by_the_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO ticket_statuses (id, name) VALUES (1, 'open')")
            .execute(&pool)
            .await
            .expect("insert status");
        sqlx::query(
            "INSERT INTO tickets (id, status_id, created_at, updated_at)
             VALUES (1, 1, '2026-03-01T09:00:00.000Z', '2026-03-01T09:00:00.000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert ticket");
        sqlx::query("INSERT INTO executor_groups (id, name) VALUES (1, 'L1'), (2, 'L2')")
            .execute(&pool)
            .await
            .expect("insert groups");

        let insert_active = "INSERT INTO ticket_group_log (ticket_id, executor_group_id, assigned_at)
                             VALUES (1, ?, '2026-03-01T09:00:00.000Z')";
        sqlx::query(insert_active).bind(1_i64).execute(&pool).await.expect("first interval");
        let second = sqlx::query(insert_active).bind(2_i64).execute(&pool).await;

        assert!(second.is_err(), "a second active interval must violate the partial index");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let log_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'ticket_group_log'",
        )
        .fetch_one(&pool)
        .await
        .expect("check ticket_group_log table removed")
        .get::<i64, _>("count");

        assert_eq!(log_count, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
