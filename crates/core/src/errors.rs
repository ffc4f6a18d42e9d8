use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid entity id `{0}` (expected `<domain>.<object_id>`)")]
    InvalidEntityId(String),
    #[error("invalid expiration `{0}` (expected an empty string or a datetime)")]
    InvalidExpiration(String),
}
