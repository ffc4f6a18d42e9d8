use presence_core::config::AppConfig;
use presence_slack::{
    services::{
        ATTR_ENTITY_ID, ATTR_EXPIRATION, ATTR_STATUS_EMOJI, ATTR_STATUS_TEXT, ENTITY_MATCH_ALL,
    },
    DispatchError, ServiceCall, ServiceName,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::commands::{
    block_on, start_integration, to_data, AccountSetup, CommandResult, EXIT_INVALID_INPUT,
    EXIT_SLACK_FAILURE,
};

#[derive(Clone, Debug, Default)]
pub struct SetStatusArgs {
    pub entities: Vec<String>,
    pub text: Option<String>,
    pub emoji: Option<String>,
    pub expiration: Option<String>,
}

impl SetStatusArgs {
    /// Service payload with only the fields the operator passed.
    pub fn payload(&self) -> Value {
        let mut fields = target_fields(&self.entities);
        let optional = [
            (ATTR_STATUS_TEXT, &self.text),
            (ATTR_STATUS_EMOJI, &self.emoji),
            (ATTR_EXPIRATION, &self.expiration),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.insert(key.to_owned(), Value::String(value.clone()));
            }
        }
        Value::Object(fields)
    }
}

pub fn clear_payload(entities: &[String]) -> Value {
    Value::Object(target_fields(entities))
}

fn target_fields(entities: &[String]) -> Map<String, Value> {
    let target = if entities.is_empty() {
        Value::String(ENTITY_MATCH_ALL.to_owned())
    } else {
        Value::Array(entities.iter().cloned().map(Value::String).collect())
    };

    let mut fields = Map::new();
    fields.insert(ATTR_ENTITY_ID.to_owned(), target);
    fields
}

#[derive(Debug, Serialize)]
struct EntityFailure {
    entity_id: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct DispatchSummary<'a> {
    service: String,
    targeted: Vec<String>,
    updated: Vec<String>,
    failures: Vec<EntityFailure>,
    failed_accounts: Vec<&'a AccountSetup>,
}

pub fn run(config: &AppConfig, args: SetStatusArgs) -> CommandResult {
    invoke(config, "set-status", ServiceName::SetStatus, args.payload())
}

pub fn run_clear(config: &AppConfig, entities: Vec<String>) -> CommandResult {
    invoke(config, "clear-status", ServiceName::ClearStatus, clear_payload(&entities))
}

fn invoke(
    config: &AppConfig,
    command: &str,
    service: ServiceName,
    payload: Value,
) -> CommandResult {
    // Reject bad input before any account is contacted.
    if let Err(error) = ServiceCall::parse(service, &payload) {
        return CommandResult::failure(
            command,
            "invalid_payload",
            format!("invalid payload for `{service}`: {error}"),
            EXIT_INVALID_INPUT,
            None,
        );
    }

    block_on(command, async {
        let (integration, setups) = match start_integration(config).await {
            Ok(started) => started,
            Err(error) => return CommandResult::runtime_failure(command, error),
        };
        let failed_accounts: Vec<&AccountSetup> =
            setups.iter().filter(|setup| !setup.ok).collect();

        let report = match integration.handle(service.as_str(), &payload).await {
            Ok(report) => report,
            Err(DispatchError::UnknownService(_)) => {
                return CommandResult::failure(
                    command,
                    "slack_auth",
                    "no account passed setup, so no service is available",
                    EXIT_SLACK_FAILURE,
                    to_data(&failed_accounts),
                );
            }
            Err(error @ DispatchError::InvalidPayload { .. }) => {
                return CommandResult::failure(
                    command,
                    "invalid_payload",
                    error.to_string(),
                    EXIT_INVALID_INPUT,
                    None,
                );
            }
        };

        let all_updated = report.is_success();
        let summary = DispatchSummary {
            service: service.to_string(),
            targeted: report.targeted.iter().map(ToString::to_string).collect(),
            updated: report.updated().into_iter().map(ToString::to_string).collect(),
            failures: report
                .failures
                .iter()
                .map(|failure| EntityFailure {
                    entity_id: failure.entity_id.to_string(),
                    error: failure.source.to_string(),
                })
                .collect(),
            failed_accounts,
        };

        let message = format!(
            "{} of {} targeted entities updated",
            summary.updated.len(),
            summary.targeted.len()
        );
        if all_updated && summary.failed_accounts.is_empty() {
            CommandResult::success(command, message, to_data(&summary))
        } else {
            CommandResult::failure(
                command,
                "slack_api",
                message,
                EXIT_SLACK_FAILURE,
                to_data(&summary),
            )
        }
    })
}
