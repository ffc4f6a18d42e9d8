pub mod check;
pub mod config;
pub mod set_status;
pub mod status;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use presence_core::config::{AppConfig, ConfigError};
use presence_slack::{EntityState, Integration, WebApiConnector};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_OK: u8 = 0;
pub const EXIT_SLACK_FAILURE: u8 = 1;
pub const EXIT_CONFIG_FAILURE: u8 = 2;
pub const EXIT_INVALID_INPUT: u8 = 3;

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
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn config_failure(command: &str, error: &ConfigError) -> Self {
        Self::failure(
            command,
            "config_validation",
            format!("config validation failed: {error}"),
            EXIT_CONFIG_FAILURE,
            None,
        )
    }

    pub(crate) fn runtime_failure(command: &str, error: anyhow::Error) -> Self {
        Self::failure(command, "runtime", format!("{error:#}"), EXIT_SLACK_FAILURE, None)
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

/// Result of setting up one configured account.
#[derive(Debug, Serialize)]
pub(crate) struct AccountSetup {
    pub name: String,
    pub user_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sets up every configured account against the live Web API. Accounts whose
/// auth probe fails are reported and left out of the integration.
pub(crate) async fn start_integration(
    config: &AppConfig,
) -> anyhow::Result<(Integration, Vec<AccountSetup>)> {
    let connector =
        WebApiConnector::new(&config.slack).context("failed to build slack http client")?;
    let integration = Integration::new(Arc::new(connector));

    let mut setups = Vec::with_capacity(config.accounts.len());
    for credentials in config.credentials() {
        let name = credentials.display_name.clone();
        let user_id = credentials.user_id.to_string();
        let setup = match integration.setup_entry(credentials).await {
            Ok(entity) => {
                AccountSetup { name, user_id, ok: true, entity: Some(entity), error: None }
            }
            Err(error) => AccountSetup {
                name,
                user_id,
                ok: false,
                entity: None,
                error: Some(error.to_string()),
            },
        };
        setups.push(setup);
    }

    Ok((integration, setups))
}

/// Runs a command body on a fresh current-thread runtime.
pub(crate) fn block_on<F>(command: &str, future: F) -> CommandResult
where
    F: Future<Output = CommandResult>,
{
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
    {
        Ok(runtime) => runtime.block_on(future),
        Err(error) => CommandResult::runtime_failure(command, error),
    }
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
