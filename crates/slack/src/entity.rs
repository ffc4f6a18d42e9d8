use std::{collections::BTreeMap, sync::Arc};

use presence_core::domain::{
    account::{Credentials, EntityId, UserId},
    status::StatusUpdate,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ExpirationValue, ProfileStatus, SlackApi, SlackApiError, UserProfile};

pub const STATE_ON: &str = "on";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("status update for `{entity_id}` failed: {source}")]
pub struct StatusUpdateFailure {
    pub entity_id: EntityId,
    pub source: SlackApiError,
}

/// What the host sees of an entity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub entity_id: String,
    pub name: String,
    pub available: bool,
    pub state: &'static str,
    pub entity_picture: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ProfileFields {
    title: Option<String>,
    real_name: Option<String>,
    display_name: Option<String>,
}

/// One Slack user exposed as an always-on presence sensor.
pub struct StatusEntity {
    unique_id: UserId,
    entity_id: EntityId,
    name: String,
    api: Arc<dyn SlackApi>,
    status_text: Option<String>,
    status_emoji: Option<String>,
    status_expiration: Option<i64>,
    entity_picture: Option<String>,
    profile: ProfileFields,
}

impl StatusEntity {
    pub fn new(credentials: &Credentials, entity_id: EntityId, api: Arc<dyn SlackApi>) -> Self {
        Self {
            unique_id: credentials.user_id.clone(),
            entity_id,
            name: credentials.display_name.clone(),
            api,
            status_text: None,
            status_emoji: None,
            status_expiration: None,
            entity_picture: None,
            profile: ProfileFields::default(),
        }
    }

    pub fn unique_id(&self) -> &UserId {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // No connectivity signal feeds this yet.
    pub fn available(&self) -> bool {
        true
    }

    pub fn state(&self) -> &'static str {
        STATE_ON
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    pub fn status_emoji(&self) -> Option<&str> {
        self.status_emoji.as_deref()
    }

    pub fn entity_picture(&self) -> Option<&str> {
        self.entity_picture.as_deref()
    }

    /// Non-null profile and status fields.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        let candidates = [
            ("status_text", self.status_text.clone().map(Value::from)),
            ("status_emoji", self.status_emoji.clone().map(Value::from)),
            ("status_expiration", self.status_expiration.map(Value::from)),
            ("title", self.profile.title.clone().map(Value::from)),
            ("real_name", self.profile.real_name.clone().map(Value::from)),
            ("display_name", self.profile.display_name.clone().map(Value::from)),
        ];

        candidates
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key.to_owned(), value)))
            .collect()
    }

    pub fn snapshot(&self) -> EntityState {
        EntityState {
            unique_id: self.unique_id.to_string(),
            entity_id: self.entity_id.to_string(),
            name: self.name.clone(),
            available: self.available(),
            state: self.state(),
            entity_picture: self.entity_picture.clone(),
            attributes: self.attributes(),
        }
    }

    /// Sends one `users.profile.set` call, then re-reads the profile.
    ///
    /// On failure nothing cached changes and the refresh is skipped.
    pub async fn set_status(&mut self, update: &StatusUpdate) -> Result<(), StatusUpdateFailure> {
        if update.is_noop() {
            debug!(
                event_name = "entity.status.resend",
                entity_id = %self.entity_id,
                "update leaves every field unset; users.profile.set still goes out with cached values"
            );
        }

        let status = ProfileStatus::resolve(
            update,
            self.status_text.as_deref(),
            self.status_emoji.as_deref(),
        );

        if let Err(source) = self.api.set_profile_status(&status).await {
            warn!(
                event_name = "entity.status.update_failed",
                entity_id = %self.entity_id,
                error = %source,
                "slack status update failed"
            );
            return Err(StatusUpdateFailure { entity_id: self.entity_id.clone(), source });
        }

        info!(
            event_name = "entity.status.updated",
            entity_id = %self.entity_id,
            expiration = ?status.status_expiration,
            "slack status updated"
        );

        if status.status_text.is_some() {
            self.status_text = status.status_text;
        }
        if status.status_emoji.is_some() {
            self.status_emoji = status.status_emoji;
        }
        match status.status_expiration {
            Some(ExpirationValue::Never) => self.status_expiration = None,
            Some(ExpirationValue::Epoch(seconds)) => self.status_expiration = Some(seconds),
            None => {}
        }

        if let Err(error) = self.refresh().await {
            warn!(
                event_name = "entity.refresh.failed",
                entity_id = %self.entity_id,
                error = %error,
                "profile refresh after status update failed; keeping cached values"
            );
        }

        Ok(())
    }

    pub async fn clear_status(&mut self) -> Result<(), StatusUpdateFailure> {
        self.set_status(&StatusUpdate::clear()).await
    }

    /// Reads the remote profile back into the cached fields.
    pub async fn refresh(&mut self) -> Result<(), SlackApiError> {
        let profile = self.api.get_profile(&self.unique_id).await?;
        self.apply_profile(profile);
        debug!(
            event_name = "entity.refresh.completed",
            entity_id = %self.entity_id,
            "profile refreshed"
        );
        Ok(())
    }

    fn apply_profile(&mut self, profile: UserProfile) {
        self.entity_picture = profile.picture().map(str::to_owned);
        self.status_text = profile.status_text;
        self.status_emoji = profile.status_emoji;
        self.status_expiration = profile.status_expiration.filter(|seconds| *seconds > 0);
        self.profile = ProfileFields {
            title: profile.title.filter(|value| !value.is_empty()),
            real_name: profile.real_name.filter(|value| !value.is_empty()),
            display_name: profile.display_name.filter(|value| !value.is_empty()),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use presence_core::domain::{
        account::{Credentials, EntityId},
        status::{Expiration, StatusField, StatusUpdate},
    };
    use serde_json::json;

    use super::StatusEntity;
    use crate::api::{ExpirationValue, SlackApiError, UserProfile, USERS_PROFILE_SET};
    use crate::testing::ScriptedSlackApi;

    fn entity_with(api: Arc<ScriptedSlackApi>) -> StatusEntity {
        let credentials = Credentials::new("U012AB3CD", "xoxp-test", "Jane Doe");
        StatusEntity::new(&credentials, EntityId::for_display_name("Jane Doe"), api)
    }

    fn seeded_profile() -> UserProfile {
        UserProfile {
            real_name: Some("Jane Doe".to_owned()),
            title: Some(String::new()),
            status_text: Some("Lunch".to_owned()),
            status_emoji: Some(":taco:".to_owned()),
            image_192: Some("https://example.test/192.png".to_owned()),
            ..UserProfile::default()
        }
    }

    #[test]
    fn surface_is_always_available_and_on() {
        let entity = entity_with(Arc::new(ScriptedSlackApi::default()));
        let state = entity.snapshot();

        assert_eq!(state.unique_id, "U012AB3CD");
        assert_eq!(state.entity_id, "sensor.jane_doe");
        assert_eq!(state.name, "Jane Doe");
        assert!(state.available);
        assert_eq!(state.state, "on");
        assert_eq!(state.entity_picture, None);
        assert!(state.attributes.is_empty());
    }

    #[tokio::test]
    async fn refresh_populates_profile_fields_and_skips_empty_ones() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());

        entity.refresh().await.expect("refresh should succeed");

        let state = entity.snapshot();
        assert_eq!(state.entity_picture.as_deref(), Some("https://example.test/192.png"));
        assert_eq!(state.attributes.get("real_name"), Some(&json!("Jane Doe")));
        assert_eq!(state.attributes.get("status_text"), Some(&json!("Lunch")));
        assert!(!state.attributes.contains_key("title"));
        assert!(!state.attributes.contains_key("status_expiration"));
    }

    #[tokio::test]
    async fn unset_update_still_calls_slack_with_prior_text_and_emoji() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());
        entity.refresh().await.expect("refresh should succeed");

        entity.set_status(&StatusUpdate::default()).await.expect("update should succeed");

        let sent = api.set_calls().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status_text.as_deref(), Some("Lunch"));
        assert_eq!(sent[0].status_emoji.as_deref(), Some(":taco:"));
        assert_eq!(sent[0].status_expiration, None);
        assert_eq!(entity.status_text(), Some("Lunch"));
        assert_eq!(entity.status_emoji(), Some(":taco:"));
    }

    #[tokio::test]
    async fn full_update_sends_empty_expiration() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());

        let update = StatusUpdate::new(
            StatusField::Set("Away".to_owned()),
            StatusField::Set("🚗".to_owned()),
            Expiration::Never,
        );
        entity.set_status(&update).await.expect("update should succeed");

        let sent = api.set_calls().await;
        assert_eq!(sent[0].status_text.as_deref(), Some("Away"));
        assert_eq!(sent[0].status_emoji.as_deref(), Some("🚗"));
        assert_eq!(sent[0].status_expiration, Some(ExpirationValue::Never));
        assert_eq!(entity.status_text(), Some("Away"));
        assert_eq!(entity.status_emoji(), Some("🚗"));
    }

    #[tokio::test]
    async fn emoji_only_update_preserves_text_and_sends_epoch_seconds() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());
        entity.refresh().await.expect("refresh should succeed");

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 17, 30, 0).single().expect("valid date");
        let update =
            StatusUpdate::new(StatusField::Unset, StatusField::Set("🚗".to_owned()), Expiration::At(at));
        entity.set_status(&update).await.expect("update should succeed");

        let sent = api.set_calls().await;
        assert_eq!(sent[0].status_text.as_deref(), Some("Lunch"));
        assert_eq!(sent[0].status_emoji.as_deref(), Some("🚗"));
        assert_eq!(sent[0].status_expiration, Some(ExpirationValue::Epoch(at.timestamp())));
        assert_eq!(entity.attributes().get("status_expiration"), Some(&json!(at.timestamp())));
    }

    #[tokio::test]
    async fn clear_status_empties_text_and_emoji() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());
        entity.refresh().await.expect("refresh should succeed");

        entity.clear_status().await.expect("clear should succeed");

        let sent = api.set_calls().await;
        assert_eq!(sent[0].status_text.as_deref(), Some(""));
        assert_eq!(sent[0].status_emoji.as_deref(), Some(""));
        assert_eq!(sent[0].status_expiration, Some(ExpirationValue::Never));
        assert_eq!(entity.status_text(), Some(""));
        assert_eq!(entity.status_emoji(), Some(""));
    }

    #[tokio::test]
    async fn failed_update_is_reported_and_leaves_cache_untouched() {
        let api = Arc::new(ScriptedSlackApi::with_profile(seeded_profile()));
        let mut entity = entity_with(api.clone());
        entity.refresh().await.expect("refresh should succeed");
        api.fail_next_set(SlackApiError::Api {
            method: USERS_PROFILE_SET,
            error: "ratelimited".to_owned(),
        })
        .await;

        let failure = entity
            .set_status(&StatusUpdate::new(
                StatusField::Set("Away".to_owned()),
                StatusField::Unset,
                Expiration::Unset,
            ))
            .await
            .expect_err("update should fail");

        assert_eq!(failure.entity_id.as_str(), "sensor.jane_doe");
        assert_eq!(entity.status_text(), Some("Lunch"));
        assert_eq!(api.get_calls().await, 1, "refresh must not run after a failed update");
    }

    #[tokio::test]
    async fn refresh_failure_after_update_keeps_sent_values() {
        let api = Arc::new(ScriptedSlackApi::default());
        api.fail_profile_reads().await;
        let mut entity = entity_with(api.clone());
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).single().expect("valid date");

        entity
            .set_status(&StatusUpdate::new(
                StatusField::Set("Focus".to_owned()),
                StatusField::Set(":headphones:".to_owned()),
                Expiration::At(at),
            ))
            .await
            .expect("update should succeed even when refresh fails");

        assert_eq!(entity.status_text(), Some("Focus"));
        assert_eq!(entity.status_emoji(), Some(":headphones:"));
        assert_eq!(entity.attributes().get("status_expiration"), Some(&json!(at.timestamp())));
    }
}
