use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use presence_core::{
    config::SlackApiConfig,
    domain::{
        account::{Credentials, UserId},
        status::{Expiration, StatusUpdate},
    },
};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const AUTH_TEST: &str = "auth.test";
pub const USERS_PROFILE_SET: &str = "users.profile.set";
pub const USERS_PROFILE_GET: &str = "users.profile.get";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack `{method}` request failed: {message}")]
    Transport { method: &'static str, message: String },
    #[error("slack `{method}` returned HTTP {status}")]
    Http { method: &'static str, status: u16 },
    #[error("slack `{method}` rejected the call: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` response could not be decoded: {message}")]
    Decode { method: &'static str, message: String },
}

/// Identity reported by `auth.test` for the token in use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub status_emoji: Option<String>,
    #[serde(default)]
    pub status_expiration: Option<i64>,
    #[serde(default)]
    pub image_192: Option<String>,
    #[serde(default)]
    pub image_72: Option<String>,
}

impl UserProfile {
    pub fn picture(&self) -> Option<&str> {
        self.image_192.as_deref().or(self.image_72.as_deref()).filter(|url| !url.is_empty())
    }
}

/// `status_expiration` on the wire: `""` for no expiration, else epoch seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpirationValue {
    Never,
    Epoch(i64),
}

impl Serialize for ExpirationValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Never => serializer.serialize_str(""),
            Self::Epoch(seconds) => serializer.serialize_i64(*seconds),
        }
    }
}

impl ExpirationValue {
    pub fn from_expiration(expiration: &Expiration) -> Option<Self> {
        match expiration {
            Expiration::Unset => None,
            Expiration::Never => Some(Self::Never),
            Expiration::At(_) => expiration.epoch_seconds().map(Self::Epoch),
        }
    }
}

/// Status portion of a `users.profile.set` body. Absent fields are left out
/// so the remote keeps its current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProfileStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_expiration: Option<ExpirationValue>,
}

impl ProfileStatus {
    pub fn resolve(
        update: &StatusUpdate,
        cached_text: Option<&str>,
        cached_emoji: Option<&str>,
    ) -> Self {
        Self {
            status_text: update.text.resolve(cached_text),
            status_emoji: update.emoji.resolve(cached_emoji),
            status_expiration: ExpirationValue::from_expiration(&update.expiration),
        }
    }

    pub fn to_body(&self) -> Value {
        serde_json::json!({ "profile": self })
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError>;
    async fn set_profile_status(&self, status: &ProfileStatus) -> Result<(), SlackApiError>;
    async fn get_profile(&self, user_id: &UserId) -> Result<UserProfile, SlackApiError>;
}

/// Builds API clients bound to one account's token.
pub trait ApiConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn SlackApi>;
}

/// Owns the process-wide HTTP client; every account's client shares its pool.
#[derive(Clone, Debug)]
pub struct WebApiConnector {
    client: Client,
    base_url: String,
}

impl WebApiConnector {
    pub fn new(config: &SlackApiConfig) -> Result<Self, SlackApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| SlackApiError::Transport {
                method: "client.build",
                message: error.to_string(),
            })?;

        Ok(Self::with_client(client, &config.api_base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_owned() }
    }
}

impl ApiConnector for WebApiConnector {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn SlackApi> {
        Arc::new(WebApiClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: credentials.token.clone(),
        })
    }
}

pub struct WebApiClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl WebApiClient {
    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call<T>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        debug!(event_name = "slack.api.request", method, "calling slack web api");

        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|error| SlackApiError::Transport { method, message: error.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Http { method, status: status.as_u16() });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| SlackApiError::Decode { method, message: error.to_string() })?;
        decode_envelope(method, body)
    }
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        self.call(AUTH_TEST, self.client.post(self.url(AUTH_TEST))).await
    }

    async fn set_profile_status(&self, status: &ProfileStatus) -> Result<(), SlackApiError> {
        let request = self.client.post(self.url(USERS_PROFILE_SET)).json(&status.to_body());
        let _: Value = self.call(USERS_PROFILE_SET, request).await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<UserProfile, SlackApiError> {
        let request =
            self.client.get(self.url(USERS_PROFILE_GET)).query(&[("user", user_id.0.as_str())]);
        let envelope: ProfileEnvelope = self.call(USERS_PROFILE_GET, request).await?;
        Ok(envelope.profile)
    }
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    profile: UserProfile,
}

/// Slack answers HTTP 200 for most failures; `ok` decides.
fn decode_envelope<T>(method: &'static str, body: Value) -> Result<T, SlackApiError>
where
    T: DeserializeOwned,
{
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();
        return Err(SlackApiError::Api { method, error });
    }

    serde_json::from_value(body)
        .map_err(|error| SlackApiError::Decode { method, message: error.to_string() })
}
