use routedesk_core::config::LoadOptions;
use routedesk_db::{HelpdeskSeedDataset, TicketSeedInfo};

use crate::commands::{
    build_runtime, load_config, open_database, CommandResult, Failure, EXIT_DB,
};

struct SeedOutput {
    tickets: Vec<TicketSeedInfo>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = HelpdeskSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_DB))?;
        let verification = HelpdeskSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_DB))?;

        let run_result: Result<SeedOutput, Failure> = if verification.all_present {
            Ok(SeedOutput { tickets: seed_result.tickets_seeded })
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err((
                "seed_verification",
                format!("seed verification failed for checks: {}", failed_checks.join(", ")),
                EXIT_DB,
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let ticket_lines: Vec<String> = output
                .tickets
                .iter()
                .map(|ticket| format!("  - ticket {}: {}", ticket.ticket_id, ticket.description))
                .collect();
            CommandResult::success(
                "seed",
                format!("seeded helpdesk dataset:\n{}", ticket_lines.join("\n")),
            )
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}
