use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use presence_core::domain::account::{Credentials, UserId};
use tokio::sync::Mutex;

use crate::api::{
    ApiConnector, AuthIdentity, ExpirationValue, ProfileStatus, SlackApi, SlackApiError,
    UserProfile, AUTH_TEST, USERS_PROFILE_GET,
};

/// In-memory Slack account: profile writes land in `profile` and are read
/// back by `get_profile`.
#[derive(Default)]
pub(crate) struct ScriptedSlackApi {
    state: Mutex<ScriptedState>,
    call_log: Option<Arc<Mutex<Vec<String>>>>,
    label: String,
}

#[derive(Default)]
struct ScriptedState {
    reject_auth: bool,
    auth_user_id: Option<String>,
    profile: UserProfile,
    set_failures: VecDeque<SlackApiError>,
    fail_profile_reads: bool,
    set_calls: Vec<ProfileStatus>,
    get_calls: usize,
}

impl ScriptedSlackApi {
    pub(crate) fn with_profile(profile: UserProfile) -> Self {
        Self {
            state: Mutex::new(ScriptedState { profile, ..ScriptedState::default() }),
            ..Self::default()
        }
    }

    pub(crate) fn logged(label: &str, call_log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { call_log: Some(call_log), label: label.to_owned(), ..Self::default() }
    }

    pub(crate) async fn reject_auth(&self) {
        self.state.lock().await.reject_auth = true;
    }

    pub(crate) async fn report_auth_user(&self, user_id: &str) {
        self.state.lock().await.auth_user_id = Some(user_id.to_owned());
    }

    pub(crate) async fn fail_next_set(&self, error: SlackApiError) {
        self.state.lock().await.set_failures.push_back(error);
    }

    pub(crate) async fn fail_profile_reads(&self) {
        self.state.lock().await.fail_profile_reads = true;
    }

    pub(crate) async fn set_calls(&self) -> Vec<ProfileStatus> {
        self.state.lock().await.set_calls.clone()
    }

    pub(crate) async fn get_calls(&self) -> usize {
        self.state.lock().await.get_calls
    }
}

#[async_trait]
impl SlackApi for ScriptedSlackApi {
    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        // Every remote call is a suspension point, as it would be over HTTP.
        tokio::task::yield_now().await;
        let state = self.state.lock().await;
        if state.reject_auth {
            return Err(SlackApiError::Api { method: AUTH_TEST, error: "invalid_auth".to_owned() });
        }

        Ok(AuthIdentity {
            user_id: state.auth_user_id.clone().unwrap_or_else(|| self.label.clone()),
            ..AuthIdentity::default()
        })
    }

    async fn set_profile_status(&self, status: &ProfileStatus) -> Result<(), SlackApiError> {
        if let Some(call_log) = &self.call_log {
            call_log.lock().await.push(self.label.clone());
        }

        let mut state = self.state.lock().await;
        state.set_calls.push(status.clone());
        if let Some(error) = state.set_failures.pop_front() {
            return Err(error);
        }

        if let Some(text) = &status.status_text {
            state.profile.status_text = Some(text.clone());
        }
        if let Some(emoji) = &status.status_emoji {
            state.profile.status_emoji = Some(emoji.clone());
        }
        match status.status_expiration {
            Some(ExpirationValue::Epoch(seconds)) => {
                state.profile.status_expiration = Some(seconds);
            }
            Some(ExpirationValue::Never) => state.profile.status_expiration = Some(0),
            None => {}
        }
        Ok(())
    }

    async fn get_profile(&self, _user_id: &UserId) -> Result<UserProfile, SlackApiError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.get_calls += 1;
        if state.fail_profile_reads {
            return Err(SlackApiError::Http { method: USERS_PROFILE_GET, status: 503 });
        }
        Ok(state.profile.clone())
    }
}

/// Hands out one scripted account per user id, creating it on first use.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    accounts: std::sync::Mutex<HashMap<String, Arc<ScriptedSlackApi>>>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub(crate) fn account(&self, user_id: &str) -> Arc<ScriptedSlackApi> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        accounts
            .entry(user_id.to_owned())
            .or_insert_with(|| {
                Arc::new(ScriptedSlackApi::logged(user_id, self.call_log.clone()))
            })
            .clone()
    }

    pub(crate) async fn call_log(&self) -> Vec<String> {
        self.call_log.lock().await.clone()
    }
}

impl ApiConnector for ScriptedConnector {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn SlackApi> {
        self.account(&credentials.user_id.0)
    }
}
