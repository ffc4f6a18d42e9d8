use presence_core::config::AppConfig;

use crate::commands::{block_on, start_integration, to_data, CommandResult, EXIT_SLACK_FAILURE};

const COMMAND: &str = "check";

pub fn run(config: &AppConfig) -> CommandResult {
    block_on(COMMAND, async {
        let (_, setups) = match start_integration(config).await {
            Ok(started) => started,
            Err(error) => return CommandResult::runtime_failure(COMMAND, error),
        };

        let total = setups.len();
        let verified = setups.iter().filter(|setup| setup.ok).count();
        let message = format!("{verified}/{total} accounts passed the slack auth probe");

        if verified == total {
            CommandResult::success(COMMAND, message, to_data(&setups))
        } else {
            let data = to_data(&setups);
            CommandResult::failure(COMMAND, "slack_auth", message, EXIT_SLACK_FAILURE, data)
        }
    })
}
