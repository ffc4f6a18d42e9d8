use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const ENTITY_DOMAIN: &str = "sensor";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host-facing identifier of an entity, always `<domain>.<object_id>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let Some((domain, object_id)) = normalized.split_once('.') else {
            return Err(DomainError::InvalidEntityId(raw.to_owned()));
        };

        let valid_part = |part: &str| {
            !part.is_empty()
                && !part.starts_with('_')
                && !part.ends_with('_')
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
        };
        if !valid_part(domain) || !valid_part(object_id) {
            return Err(DomainError::InvalidEntityId(raw.to_owned()));
        }

        Ok(Self(normalized))
    }

    /// Builds `sensor.<slug>` for a display name, falling back to `unnamed`
    /// when nothing sluggable is left.
    pub fn for_display_name(name: &str) -> Self {
        let slug = slugify(name);
        let object_id = if slug.is_empty() { "unnamed".to_owned() } else { slug };
        Self(format!("{ENTITY_DOMAIN}.{object_id}"))
    }

    pub fn with_suffix(&self, ordinal: usize) -> Self {
        Self(format!("{}_{ordinal}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials for one Slack account. The token never leaves the secret
/// wrapper except when an API client is built.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub user_id: UserId,
    pub token: SecretString,
    pub display_name: String,
}

impl Credentials {
    pub fn new(
        user_id: impl Into<String>,
        token: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            token: SecretString::from(token.into()),
            display_name: display_name.into(),
        }
    }
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}
