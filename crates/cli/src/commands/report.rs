use anyhow::Context;
use routedesk_core::chrono::{DateTime, Utc};
use routedesk_core::config::LoadOptions;
use routedesk_db::{ReportWindow, SqlComplianceAnalytics};

use crate::commands::{
    build_runtime, load_config, open_database, to_details, CommandResult, EXIT_CONFIG, EXIT_DB,
};

pub fn run(options: &LoadOptions, from: Option<&str>, to: Option<&str>) -> CommandResult {
    let window = match parse_window(from, to) {
        Ok(window) => window,
        Err(error) => {
            return CommandResult::failure(
                "report",
                "invalid_argument",
                format!("{error:#}"),
                EXIT_CONFIG,
            );
        }
    };
    let config = match load_config("report", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("report") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let dashboard = SqlComplianceAnalytics::new(pool.clone())
            .dashboard(window)
            .await
            .map_err(|error| ("db_query", error.to_string(), EXIT_DB));
        pool.close().await;
        dashboard
    });

    let outcome = result.and_then(|dashboard| {
        let message = format!(
            "{} violations, {:.1}% compliance across {} tickets with an sla",
            dashboard.total_violations,
            dashboard.sla_compliance_percent,
            dashboard.total_tickets_with_sla
        );
        Ok((message, to_details("dashboard", dashboard)?))
    });

    match outcome {
        Ok((message, details)) => CommandResult::success_with("report", message, details),
        Err(failure) => CommandResult::from_failure("report", failure),
    }
}

fn parse_window(from: Option<&str>, to: Option<&str>) -> anyhow::Result<ReportWindow> {
    let window = ReportWindow {
        from: from.map(|value| parse_bound("--from", value)).transpose()?,
        to: to.map(|value| parse_bound("--to", value)).transpose()?,
    };
    if let (Some(from), Some(to)) = (window.from, window.to) {
        anyhow::ensure!(from <= to, "--from must not be later than --to");
    }
    Ok(window)
}

fn parse_bound(flag: &str, value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .with_context(|| format!("{flag} expects an RFC 3339 timestamp, got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::parse_window;

    #[test]
    fn window_bounds_must_be_rfc3339_and_ordered() {
        let window = parse_window(Some("2026-03-01T00:00:00Z"), None).expect("valid window");
        assert!(window.from.is_some());
        assert!(window.to.is_none());

        let malformed = parse_window(Some("yesterday"), None).expect_err("malformed bound");
        assert!(format!("{malformed:#}").contains("--from"));

        let inverted = parse_window(Some("2026-03-02T00:00:00Z"), Some("2026-03-01T00:00:00Z"));
        assert!(inverted.is_err());
    }
}
