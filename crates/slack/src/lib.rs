//! Slack user status integration
//!
//! Exposes each configured Slack account as a presence entity and offers two
//! services that act on those entities:
//! - **`slack_user.set_status`** - set text, emoji and an optional expiration
//! - **`slack_user.clear_status`** - clear text, emoji and expiration
//!
//! # Architecture
//!
//! ```text
//! service call → Integration::handle → ServiceCall (schema) → StatusEntity
//!                                                               ↓
//!                               users.profile.set → users.profile.get (refresh)
//! ```
//!
//! # Key Types
//!
//! - `Integration` - entry setup/unload, entity registry, service dispatch
//! - `StatusEntity` - one Slack user, always-on presence sensor
//! - `SlackApi` - Web API seam; `WebApiClient` is the reqwest implementation
//! - `ServiceCall` - validated service payload

pub mod api;
pub mod entity;
pub mod integration;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiConnector, SlackApi, SlackApiError, WebApiConnector};
pub use entity::{EntityState, StatusEntity, StatusUpdateFailure};
pub use integration::{DispatchError, DispatchReport, Integration, IntegrationSummary, SetupError};
pub use services::{ServiceCall, ServiceName, DOMAIN};
