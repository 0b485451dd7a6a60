use routedesk_core::config::LoadOptions;
use routedesk_core::domain::service::{ServiceId, TicketServiceId};
use routedesk_db::SlaService;

use crate::commands::{
    build_runtime, engine_failure, load_config, open_database, to_details, CommandResult,
};

pub fn executor(
    options: &LoadOptions,
    ticket_service_id: Option<i64>,
    service_ids: &[i64],
) -> CommandResult {
    const COMMAND: &str = "resolve-executor";
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let (ticket_service_id, service_ids) = classification(ticket_service_id, service_ids);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let service = SlaService::system(pool.clone());
        let resolved = service
            .resolve_executor(ticket_service_id, &service_ids)
            .await
            .map_err(|error| engine_failure(COMMAND, error));
        pool.close().await;
        resolved
    });

    let outcome = result.and_then(|user_id| {
        let message = match user_id {
            Some(_) => "executor resolved",
            None => "no executor matched the classification",
        };
        Ok((message, to_details("user_id", user_id.map(|user| user.0))?))
    });

    match outcome {
        Ok((message, details)) => CommandResult::success_with(COMMAND, message, details),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

pub fn sla(
    options: &LoadOptions,
    ticket_service_id: Option<i64>,
    service_ids: &[i64],
) -> CommandResult {
    const COMMAND: &str = "resolve-sla";
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let (ticket_service_id, service_ids) = classification(ticket_service_id, service_ids);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let service = SlaService::system(pool.clone());
        let resolved = service
            .resolve_sla(ticket_service_id, &service_ids)
            .await
            .map_err(|error| engine_failure(COMMAND, error));
        pool.close().await;
        resolved
    });

    let outcome = result.and_then(|sla| {
        let message = match sla {
            Some(_) => "sla resolved",
            None => "no sla mapped to the classification",
        };
        Ok((message, to_details("sla", sla)?))
    });

    match outcome {
        Ok((message, details)) => CommandResult::success_with(COMMAND, message, details),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

fn classification(
    ticket_service_id: Option<i64>,
    service_ids: &[i64],
) -> (Option<TicketServiceId>, Vec<ServiceId>) {
    (ticket_service_id.map(TicketServiceId), service_ids.iter().copied().map(ServiceId).collect())
}
