use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// One attribute of a status update.
///
/// `Unset` keeps whatever the entity last knew, `Clear` sends an empty value
/// and `Set` replaces it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    #[default]
    Unset,
    Clear,
    Set(String),
}

impl StatusField {
    /// Maps an optional payload value onto a field. An empty string is a
    /// request to clear, not to leave the value alone.
    pub fn from_optional(value: Option<String>) -> Self {
        match value {
            None => Self::Unset,
            Some(value) if value.is_empty() => Self::Clear,
            Some(value) => Self::Set(value),
        }
    }

    /// Value to transmit given the cached one. `None` means the field is
    /// left out of the outbound body so the remote keeps its own value.
    pub fn resolve(&self, cached: Option<&str>) -> Option<String> {
        match self {
            Self::Unset => cached.map(str::to_owned),
            Self::Clear => Some(String::new()),
            Self::Set(value) => Some(value.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiration {
    #[default]
    Unset,
    Never,
    At(DateTime<Utc>),
}

impl Expiration {
    /// Parses the service form: `""` means no expiration, anything else must
    /// be a datetime. Naive datetimes are taken as UTC.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::Never);
        }

        parse_datetime(trimmed)
            .map(Self::At)
            .ok_or_else(|| DomainError::InvalidExpiration(raw.to_owned()))
    }

    pub fn epoch_seconds(&self) -> Option<i64> {
        match self {
            Self::At(at) => Some(at.timestamp()),
            Self::Unset | Self::Never => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub text: StatusField,
    pub emoji: StatusField,
    pub expiration: Expiration,
}

impl StatusUpdate {
    pub fn new(text: StatusField, emoji: StatusField, expiration: Expiration) -> Self {
        Self { text, emoji, expiration }
    }

    /// Unconditional clear: empty text, empty emoji, no expiration.
    pub fn clear() -> Self {
        Self { text: StatusField::Clear, emoji: StatusField::Clear, expiration: Expiration::Never }
    }

    pub fn is_noop(&self) -> bool {
        self.text == StatusField::Unset
            && self.emoji == StatusField::Unset
            && self.expiration == Expiration::Unset
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
