pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AccountConfig, AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::account::{Credentials, EntityId, UserId, ENTITY_DOMAIN};
pub use domain::status::{Expiration, StatusField, StatusUpdate};
pub use errors::DomainError;
