pub mod auto_close;
pub mod config;
pub mod migrate;
pub mod report;
pub mod resolve;
pub mod seed;

use routedesk_core::config::{AppConfig, LoadOptions};
use routedesk_core::errors::ApplicationError;
use routedesk_db::{connect_with_config, migrations, new_correlation_id, DbPool};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_ENGINE: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(flatten)]
    details: Map<String, Value>,
}

/// Error class, message and exit code of a command that did not complete.
pub(crate) type Failure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, Map::new())
    }

    /// Success payload carrying extra top-level fields next to the standard
    /// ones.
    pub fn success_with(
        command: &str,
        message: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: Map::new(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Connects and brings the schema up to date before a command touches it.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// Maps an engine failure onto the interface layer. The correlation id in the
/// payload matches the warning logged here.
pub(crate) fn engine_failure(command: &str, error: ApplicationError) -> Failure {
    let interface = error.into_interface(new_correlation_id());
    tracing::warn!(
        event_name = "cli.command.failed",
        command,
        error_class = interface.error_class(),
        correlation_id = interface.correlation_id(),
        error = %interface,
        "command failed"
    );
    let message = format!(
        "{} {interface} (correlation_id {})",
        interface.user_message(),
        interface.correlation_id()
    );
    (interface.error_class(), message, EXIT_ENGINE)
}

pub(crate) fn to_details(key: &str, value: impl Serialize) -> Result<Map<String, Value>, Failure> {
    let value = serde_json::to_value(value)
        .map_err(|error| ("serialization", error.to_string(), EXIT_RUNTIME))?;
    let mut details = Map::new();
    details.insert(key.to_string(), value);
    Ok(details)
}
