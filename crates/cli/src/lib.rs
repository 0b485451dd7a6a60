pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use routedesk_core::config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "routedesk",
    about = "Routedesk operator CLI",
    long_about = "Resolve executors and SLAs, run the auto-close sweep, and report SLA compliance.",
    after_help = "Examples:\n  routedesk migrate\n  routedesk resolve-executor --ticket-service 10 --service 101\n  routedesk report --from 2026-03-01T00:00:00Z"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a routedesk.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                sweep_grace_period_hours: None,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic helpdesk demo dataset")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Resolve the executor for a ticket service combo")]
    ResolveExecutor {
        #[arg(long = "ticket-service")]
        ticket_service: Option<i64>,
        #[arg(long = "service")]
        services: Vec<i64>,
    },
    #[command(about = "Resolve the most specific SLA for a ticket service combo")]
    ResolveSla {
        #[arg(long = "ticket-service")]
        ticket_service: Option<i64>,
        #[arg(long = "service")]
        services: Vec<i64>,
    },
    #[command(about = "Close tickets whose confirmation grace period has expired")]
    AutoClose {
        #[arg(long, help = "Override sweep.grace_period_hours for this run")]
        grace_period_hours: Option<u32>,
    },
    #[command(about = "Print the SLA compliance dashboard")]
    Report {
        #[arg(long, help = "Inclusive lower bound (RFC 3339)")]
        from: Option<String>,
        #[arg(long, help = "Inclusive upper bound (RFC 3339)")]
        to: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let mut options = cli.global.load_options();

    let (startup, config_error) = startup_config(&options);
    if let Err(error) = init_logging(&startup) {
        eprintln!("routedesk: logging disabled: {error}");
    }
    if let Some(error) = config_error {
        tracing::warn!(
            event_name = "cli.config.invalid",
            error = %error,
            "configuration failed to load; logging with defaults"
        );
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::ResolveExecutor { ticket_service, services } => {
            commands::resolve::executor(&options, ticket_service, &services)
        }
        Command::ResolveSla { ticket_service, services } => {
            commands::resolve::sla(&options, ticket_service, &services)
        }
        Command::AutoClose { grace_period_hours } => {
            options.overrides.sweep_grace_period_hours = grace_period_hours;
            commands::auto_close::run(&options)
        }
        Command::Report { from, to } => {
            commands::report::run(&options, from.as_deref(), to.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Config used to set up logging. A config that fails to load falls back to
/// the defaults; the command itself still reports the failure.
fn startup_config(options: &LoadOptions) -> (AppConfig, Option<ConfigError>) {
    match AppConfig::load(options.clone()) {
        Ok(config) => (config, None),
        Err(error) => (AppConfig::default(), Some(error)),
    }
}

/// Logs go to stderr; stdout carries only the command payload.
fn init_logging(config: &AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use routedesk_core::config::{AppConfig, LoadOptions};

    use super::startup_config;

    #[test]
    fn startup_config_falls_back_to_defaults_when_loading_fails() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/routedesk.toml")),
            require_file: true,
            ..LoadOptions::default()
        };

        let (config, error) = startup_config(&options);

        assert!(error.is_some());
        assert_eq!(config.logging.level, AppConfig::default().logging.level);
        assert_eq!(config.logging.format, AppConfig::default().logging.format);
    }
}
