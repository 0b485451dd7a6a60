use routedesk_core::config::LoadOptions;
use routedesk_core::engine::SlaEngine;
use routedesk_db::run_auto_close;

use crate::commands::{
    build_runtime, engine_failure, load_config, open_database, to_details, CommandResult,
};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("auto-close", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("auto-close") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let report = run_auto_close(&pool, &SlaEngine::system(), &config.sweep)
            .await
            .map_err(|error| engine_failure("auto-close", error));
        pool.close().await;
        report
    });

    let outcome = result.and_then(|report| {
        let message = format!(
            "closed {} of {} tickets awaiting confirmation",
            report.closed_tickets.len(),
            report.candidates
        );
        Ok((message, to_details("report", report)?))
    });

    match outcome {
        Ok((message, details)) => CommandResult::success_with("auto-close", message, details),
        Err(failure) => CommandResult::from_failure("auto-close", failure),
    }
}
