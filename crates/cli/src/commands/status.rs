use presence_core::config::AppConfig;
use presence_slack::IntegrationSummary;
use serde::Serialize;

use crate::commands::{
    block_on, start_integration, to_data, AccountSetup, CommandResult, EXIT_SLACK_FAILURE,
};

const COMMAND: &str = "status";

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    integration: IntegrationSummary,
    failed_accounts: Vec<&'a AccountSetup>,
}

pub fn run(config: &AppConfig) -> CommandResult {
    block_on(COMMAND, async {
        let (integration, setups) = match start_integration(config).await {
            Ok(started) => started,
            Err(error) => return CommandResult::runtime_failure(COMMAND, error),
        };

        let report = StatusReport {
            integration: integration.summary().await,
            failed_accounts: setups.iter().filter(|setup| !setup.ok).collect(),
        };
        let message = format!("{} entities registered", report.integration.entities.len());

        if report.failed_accounts.is_empty() {
            CommandResult::success(COMMAND, message, to_data(&report))
        } else {
            CommandResult::failure(
                COMMAND,
                "slack_auth",
                format!("{message}; {} accounts failed setup", report.failed_accounts.len()),
                EXIT_SLACK_FAILURE,
                to_data(&report),
            )
        }
    })
}
