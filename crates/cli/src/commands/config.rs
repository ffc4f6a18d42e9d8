use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use presence_core::config::{resolve_config_path, AccountConfig, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use crate::commands::{to_data, CommandResult};

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: String,
    value: String,
    source: String,
}

/// Where the effective config was read from, for source attribution.
struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigFile {
    fn detect(explicit_path: Option<&Path>) -> Self {
        let path = resolve_config_path(explicit_path);
        let doc = path.as_deref().and_then(load_config_file_doc);
        Self { path, doc }
    }

    fn label(&self) -> String {
        let path = self
            .path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        format!("file ({path})")
    }

    fn account(&self, id: &str) -> Option<&Value> {
        self.doc
            .as_ref()?
            .get("accounts")?
            .as_array()?
            .iter()
            .find(|account| account.get("id").and_then(Value::as_str) == Some(id))
    }
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_path = options.config_path.clone();
    match AppConfig::load(options) {
        Ok(config) => render(&config, config_path.as_deref()),
        Err(error) => CommandResult::config_failure(COMMAND, &error),
    }
}

pub fn render(config: &AppConfig, config_path: Option<&Path>) -> CommandResult {
    let file = ConfigFile::detect(config_path);
    let mut entries = Vec::new();

    entries.push(entry(
        "slack.api_base_url",
        &config.slack.api_base_url,
        field_source("slack.api_base_url", &["PRESENCE_API_BASE_URL"], &file),
    ));
    entries.push(entry(
        "slack.timeout_secs",
        &config.slack.timeout_secs.to_string(),
        field_source("slack.timeout_secs", &["PRESENCE_TIMEOUT_SECS"], &file),
    ));

    for (index, account) in config.accounts.iter().enumerate() {
        entries.extend(account_entries(index, account, &file));
    }

    entries.push(entry(
        "logging.level",
        &config.logging.level,
        field_source("logging.level", &["PRESENCE_LOGGING_LEVEL", "PRESENCE_LOG_LEVEL"], &file),
    ));
    entries.push(entry(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        field_source("logging.format", &["PRESENCE_LOGGING_FORMAT", "PRESENCE_LOG_FORMAT"], &file),
    ));

    CommandResult::success(
        COMMAND,
        "effective config (source precedence: env > file > default)",
        to_data(&entries),
    )
}

fn account_entries(index: usize, account: &AccountConfig, file: &ConfigFile) -> Vec<ConfigEntry> {
    let from_env = env::var("PRESENCE_USER_ID").ok().as_deref() == Some(account.id.as_str());
    let file_account = file.account(&account.id);

    let source_of = |env_key: &str, file_key: &str| {
        if from_env && env::var_os(env_key).is_some() {
            format!("env ({env_key})")
        } else if file_account.is_some_and(|value| value.get(file_key).is_some()) {
            file.label()
        } else if file_key == "name" {
            "default (account id)".to_string()
        } else {
            "override".to_string()
        }
    };

    let key = |field: &str| format!("accounts[{index}].{field}");
    vec![
        entry(&key("id"), &account.id, source_of("PRESENCE_USER_ID", "id")),
        entry(&key("name"), &account.name, source_of("PRESENCE_NAME", "name")),
        entry(
            &key("token"),
            &redact_token(account.token.expose_secret()),
            source_of("PRESENCE_TOKEN", "token"),
        ),
    ]
}

fn entry(key: &str, value: &str, source: String) -> ConfigEntry {
    ConfigEntry { key: key.to_string(), value: value.to_string(), source }
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], file: &ConfigFile) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file.doc.as_ref() {
        if contains_path(doc, key_path) {
            return file.label();
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
