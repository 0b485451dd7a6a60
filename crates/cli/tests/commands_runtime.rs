use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use routedesk_cli::commands::{auto_close, config, migrate, report, resolve, seed};
use routedesk_core::config::{ConfigOverrides, LoadOptions};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ROUTEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("ROUTEDESK_DATABASE_URL", "postgres://localhost/routedesk")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_sources_for_each_key() {
    with_env(
        &[("ROUTEDESK_DATABASE_URL", "sqlite::memory:"), ("ROUTEDESK_LOG_LEVEL", "debug")],
        || {
            let options = LoadOptions {
                overrides: ConfigOverrides {
                    sweep_grace_period_hours: Some(12),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            };
            let result = config::run(&options);
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let entries = payload["entries"].as_array().expect("entries array");
            let source_of = |key: &str| {
                entries
                    .iter()
                    .find(|entry| entry["key"] == key)
                    .map(|entry| entry["source"].as_str().unwrap_or_default().to_string())
                    .unwrap_or_default()
            };

            assert_eq!(source_of("database.url"), "env (ROUTEDESK_DATABASE_URL)");
            assert_eq!(source_of("logging.level"), "env (ROUTEDESK_LOG_LEVEL)");
            assert_eq!(source_of("sweep.grace_period_hours"), "override");
            assert_eq!(source_of("sweep.batch_limit"), "default");
        },
    );
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("create temp dir");
    with_env(&[], || {
        let options = file_database(dir.path());

        let first = seed::run(&options);
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run(&options);
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["message"], second_payload["message"]);
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("  - ticket 2: Standard SLA, awaiting confirmation since 2026-02-19"));
    });
}

#[test]
fn resolve_commands_answer_from_the_seeded_mappings() {
    let dir = tempfile::tempdir().expect("create temp dir");
    with_env(&[], || {
        let options = file_database(dir.path());
        assert_eq!(seed::run(&options).exit_code, 0);

        let executor = resolve::executor(&options, Some(10), &[101]);
        assert_eq!(executor.exit_code, 0);
        let payload = parse_payload(&executor.output);
        assert_eq!(payload["command"], "resolve-executor");
        assert_eq!(payload["user_id"], 5);

        let unresolved = resolve::executor(&options, Some(10), &[103]);
        assert_eq!(parse_payload(&unresolved.output)["user_id"], Value::Null);

        let sla = resolve::sla(&options, Some(10), &[101, 102]);
        assert_eq!(sla.exit_code, 0);
        let payload = parse_payload(&sla.output);
        assert_eq!(payload["command"], "resolve-sla");
        assert_eq!(payload["sla"]["id"], 2);
        assert_eq!(payload["sla"]["name"], "Critical");
    });
}

#[test]
fn auto_close_then_report_reflects_the_sweep() {
    let dir = tempfile::tempdir().expect("create temp dir");
    with_env(&[], || {
        let options = file_database(dir.path());
        assert_eq!(seed::run(&options).exit_code, 0);

        let sweep = auto_close::run(&options);
        assert_eq!(sweep.exit_code, 0);
        let payload = parse_payload(&sweep.output);
        assert_eq!(payload["command"], "auto-close");
        assert_eq!(payload["report"]["closed_tickets"], serde_json::json!([2]));

        let dashboard = report::run(&options, None, None);
        assert_eq!(dashboard.exit_code, 0);
        let payload = parse_payload(&dashboard.output);
        assert_eq!(payload["command"], "report");
        assert_eq!(payload["dashboard"]["total_violations"], 2);
        assert_eq!(payload["dashboard"]["violated_tickets"], 1);
    });
}

#[test]
fn report_rejects_malformed_window_bounds() {
    with_env(&[("ROUTEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = report::run(&LoadOptions::default(), Some("last tuesday"), None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

fn file_database(dir: &Path) -> LoadOptions {
    let url = format!("sqlite://{}?mode=rwc", dir.join("routedesk.db").display());
    LoadOptions {
        overrides: ConfigOverrides { database_url: Some(url), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ROUTEDESK_DATABASE_URL",
        "ROUTEDESK_DATABASE_MAX_CONNECTIONS",
        "ROUTEDESK_DATABASE_TIMEOUT_SECS",
        "ROUTEDESK_SWEEP_GRACE_PERIOD_HOURS",
        "ROUTEDESK_SWEEP_AUTO_RATING",
        "ROUTEDESK_SWEEP_BATCH_LIMIT",
        "ROUTEDESK_LOGGING_LEVEL",
        "ROUTEDESK_LOGGING_FORMAT",
        "ROUTEDESK_LOG_LEVEL",
        "ROUTEDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
