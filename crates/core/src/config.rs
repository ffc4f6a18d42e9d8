use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::account::Credentials;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["presence.toml", "config/presence.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackApiConfig,
    pub accounts: Vec<AccountConfig>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackApiConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AccountConfig {
    pub id: String,
    pub token: SecretString,
    pub name: String,
}

impl AccountConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.id.clone(), self.token.expose_secret(), self.name.clone())
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackApiConfig {
                api_base_url: "https://slack.com/api".to_string(),
                timeout_secs: 10,
            },
            accounts: Vec::new(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides)?;
        config.validate()?;

        Ok(config)
    }

    pub fn credentials(&self) -> Vec<Credentials> {
        self.accounts.iter().map(AccountConfig::credentials).collect()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        for account in patch.accounts {
            let name = account.name.unwrap_or_else(|| account.id.clone());
            self.accounts.push(AccountConfig {
                id: account.id,
                token: secret_value(account.token),
                name,
            });
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRESENCE_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("PRESENCE_TIMEOUT_SECS") {
            self.slack.timeout_secs = parse_u64("PRESENCE_TIMEOUT_SECS", &value)?;
        }

        self.upsert_account(
            read_env("PRESENCE_USER_ID"),
            read_env("PRESENCE_TOKEN"),
            read_env("PRESENCE_NAME"),
            "PRESENCE_USER_ID and PRESENCE_TOKEN",
        )?;

        let log_level =
            read_env("PRESENCE_LOGGING_LEVEL").or_else(|| read_env("PRESENCE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRESENCE_LOGGING_FORMAT").or_else(|| read_env("PRESENCE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(api_base_url) = overrides.api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.slack.timeout_secs = timeout_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }

        self.upsert_account(
            overrides.user_id,
            overrides.token,
            overrides.name,
            "user id and token overrides",
        )
    }

    /// Single-account shortcut: replaces the token (and name, when given) of a
    /// configured account with the same id, or appends a new account.
    fn upsert_account(
        &mut self,
        user_id: Option<String>,
        token: Option<String>,
        name: Option<String>,
        source: &str,
    ) -> Result<(), ConfigError> {
        let (user_id, token) = match (user_id, token) {
            (None, None) => return Ok(()),
            (Some(user_id), Some(token)) => (user_id, token),
            _ => {
                return Err(ConfigError::Validation(format!("{source} must be set together")));
            }
        };

        if let Some(existing) = self.accounts.iter_mut().find(|account| account.id == user_id) {
            existing.token = secret_value(token);
            if let Some(name) = name {
                existing.name = name;
            }
            return Ok(());
        }

        let name = name.unwrap_or_else(|| user_id.clone());
        self.accounts.push(AccountConfig { id: user_id, token: secret_value(token), name });
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_accounts(&self.accounts)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackApiConfig) -> Result<(), ConfigError> {
    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if slack.timeout_secs == 0 || slack.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_accounts(accounts: &[AccountConfig]) -> Result<(), ConfigError> {
    if accounts.is_empty() {
        return Err(ConfigError::Validation(
            "at least one account is required. Add an [[accounts]] table with id, token and name, or set PRESENCE_USER_ID and PRESENCE_TOKEN".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, account) in accounts.iter().enumerate() {
        let id = account.id.trim();
        if id.is_empty() {
            return Err(ConfigError::Validation(format!("accounts[{index}].id is required")));
        }
        if !id.chars().all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()) {
            return Err(ConfigError::Validation(format!(
                "accounts[{index}].id `{id}` must be a Slack user id such as `U012AB3CD`"
            )));
        }
        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!(
                "accounts[{index}].id `{id}` is configured more than once"
            )));
        }

        let token = account.token.expose_secret(); // ubs:ignore
        if token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "accounts[{index}].token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > User OAuth Token"
            )));
        }

        if account.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("accounts[{index}].name is empty")));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    #[serde(default)]
    accounts: Vec<AccountPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AccountPatch {
    id: String,
    token: String,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
