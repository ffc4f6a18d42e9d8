//! Service names, payload schemas and the registry that keeps one handler
//! per service no matter how many accounts are set up.

use std::{collections::BTreeSet, fmt};

use presence_core::{
    domain::{
        account::EntityId,
        status::{Expiration, StatusField, StatusUpdate},
    },
    errors::DomainError,
};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DOMAIN: &str = "slack_user";

pub const SERVICE_SET_STATUS: &str = "set_status";
pub const SERVICE_CLEAR_STATUS: &str = "clear_status";

pub const ATTR_ENTITY_ID: &str = "entity_id";
pub const ATTR_STATUS_TEXT: &str = "status_text";
pub const ATTR_STATUS_EMOJI: &str = "status_emoji";
pub const ATTR_EXPIRATION: &str = "expiration";

pub const ENTITY_MATCH_ALL: &str = "all";
pub const ENTITY_MATCH_NONE: &str = "none";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceName {
    SetStatus,
    ClearStatus,
}

impl ServiceName {
    pub const ALL: [Self; 2] = [Self::SetStatus, Self::ClearStatus];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            SERVICE_SET_STATUS => Some(Self::SetStatus),
            SERVICE_CLEAR_STATUS => Some(Self::ClearStatus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetStatus => SERVICE_SET_STATUS,
            Self::ClearStatus => SERVICE_CLEAR_STATUS,
        }
    }

    fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            Self::SetStatus => {
                &[ATTR_ENTITY_ID, ATTR_STATUS_TEXT, ATTR_STATUS_EMOJI, ATTR_EXPIRATION]
            }
            Self::ClearStatus => &[ATTR_ENTITY_ID],
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DOMAIN}.{}", self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("service payload must be an object")]
    NotAnObject,
    #[error("required key `{0}` is missing")]
    MissingField(&'static str),
    #[error("extra key `{0}` is not allowed")]
    UnexpectedField(String),
    #[error("`{field}` must be {expected}")]
    InvalidType { field: &'static str, expected: &'static str },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityTarget {
    All,
    Ids(Vec<EntityId>),
}

impl EntityTarget {
    /// Accepts a single id, a comma-separated string, a list of ids, or the
    /// `all` / `none` keywords.
    pub fn parse(value: &Value) -> Result<Self, SchemaError> {
        let raw_ids: Vec<&str> = match value {
            Value::String(raw) => {
                let keyword = raw.trim().to_ascii_lowercase();
                if keyword == ENTITY_MATCH_ALL {
                    return Ok(Self::All);
                }
                if keyword == ENTITY_MATCH_NONE {
                    return Ok(Self::Ids(Vec::new()));
                }
                raw.split(',').map(str::trim).filter(|part| !part.is_empty()).collect()
            }
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or(SchemaError::InvalidType {
                        field: ATTR_ENTITY_ID,
                        expected: "a list of entity id strings",
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(SchemaError::InvalidType {
                    field: ATTR_ENTITY_ID,
                    expected: "an entity id string or a list of them",
                })
            }
        };

        if raw_ids.iter().any(|raw| raw.eq_ignore_ascii_case(ENTITY_MATCH_ALL)) {
            return Ok(Self::All);
        }

        let mut ids = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let id = EntityId::parse(raw)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(Self::Ids(ids))
    }
}

/// A validated service invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    SetStatus { target: EntityTarget, update: StatusUpdate },
    ClearStatus { target: EntityTarget },
}

impl ServiceCall {
    pub fn parse(service: ServiceName, payload: &Value) -> Result<Self, SchemaError> {
        let Value::Object(fields) = payload else {
            return Err(SchemaError::NotAnObject);
        };

        if let Some(extra) =
            fields.keys().find(|key| !service.allowed_fields().contains(&key.as_str()))
        {
            return Err(SchemaError::UnexpectedField(extra.clone()));
        }

        let target = fields
            .get(ATTR_ENTITY_ID)
            .ok_or(SchemaError::MissingField(ATTR_ENTITY_ID))
            .and_then(EntityTarget::parse)?;

        match service {
            ServiceName::ClearStatus => Ok(Self::ClearStatus { target }),
            ServiceName::SetStatus => {
                let text = optional_string(fields, ATTR_STATUS_TEXT)?;
                let emoji = optional_string(fields, ATTR_STATUS_EMOJI)?;
                let expiration = match optional_string(fields, ATTR_EXPIRATION)? {
                    None => Expiration::Unset,
                    Some(raw) => Expiration::parse(&raw)?,
                };

                Ok(Self::SetStatus {
                    target,
                    update: StatusUpdate::new(
                        StatusField::from_optional(text),
                        StatusField::from_optional(emoji),
                        expiration,
                    ),
                })
            }
        }
    }

    pub fn service(&self) -> ServiceName {
        match self {
            Self::SetStatus { .. } => ServiceName::SetStatus,
            Self::ClearStatus { .. } => ServiceName::ClearStatus,
        }
    }

    pub fn target(&self) -> &EntityTarget {
        match self {
            Self::SetStatus { target, .. } | Self::ClearStatus { target } => target,
        }
    }

    pub fn update(&self) -> StatusUpdate {
        match self {
            Self::SetStatus { update, .. } => update.clone(),
            Self::ClearStatus { .. } => StatusUpdate::clear(),
        }
    }
}

// Numbers are coerced to strings the way a lenient string validator does.
fn optional_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, SchemaError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(Value::Number(value)) => Ok(Some(value.to_string())),
        Some(_) => Err(SchemaError::InvalidType { field, expected: "a string" }),
    }
}

/// Services registered under the integration domain.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    registered: BTreeSet<ServiceName>,
}

impl ServiceRegistry {
    /// Returns false when the service was already registered.
    pub fn register(&mut self, service: ServiceName) -> bool {
        self.registered.insert(service)
    }

    pub fn unregister(&mut self, service: ServiceName) -> bool {
        self.registered.remove(&service)
    }

    pub fn contains(&self, service: ServiceName) -> bool {
        self.registered.contains(&service)
    }

    pub fn names(&self) -> Vec<ServiceName> {
        self.registered.iter().copied().collect()
    }
}
