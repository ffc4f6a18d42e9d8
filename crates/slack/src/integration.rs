use std::sync::Arc;

use presence_core::domain::account::{Credentials, EntityId, UserId};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{
    api::{ApiConnector, SlackApiError},
    entity::{EntityState, StatusEntity, StatusUpdateFailure},
    services::{EntityTarget, SchemaError, ServiceCall, ServiceName, ServiceRegistry, DOMAIN},
};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("error setting up slack user entry `{name}`: {source}{hint}")]
    AuthCheck { name: String, source: SlackApiError, hint: &'static str },
    #[error("slack user `{0}` is already configured")]
    AlreadyConfigured(UserId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("service `slack_user.{0}` is not registered")]
    UnknownService(String),
    #[error("invalid payload for `{service}`: {source}")]
    InvalidPayload { service: ServiceName, source: SchemaError },
}

/// Outcome of one service invocation across its resolved targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub service: ServiceName,
    pub targeted: Vec<EntityId>,
    pub failures: Vec<StatusUpdateFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn updated(&self) -> Vec<&EntityId> {
        self.targeted
            .iter()
            .filter(|id| !self.failures.iter().any(|failure| &failure.entity_id == *id))
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct IntegrationSummary {
    pub domain: &'static str,
    pub services: Vec<&'static str>,
    pub entities: Vec<EntityState>,
}

struct RegisteredEntity {
    unique_id: UserId,
    entity_id: EntityId,
    entity: Arc<Mutex<StatusEntity>>,
}

/// The `slack_user` integration: owns every configured entity and the two
/// services that act on them.
pub struct Integration {
    connector: Arc<dyn ApiConnector>,
    entities: RwLock<Vec<RegisteredEntity>>,
    services: RwLock<ServiceRegistry>,
}

impl Integration {
    pub fn new(connector: Arc<dyn ApiConnector>) -> Self {
        Self {
            connector,
            entities: RwLock::new(Vec::new()),
            services: RwLock::new(ServiceRegistry::default()),
        }
    }

    /// Verifies the token, adds the entity and makes sure the services exist.
    /// Nothing is registered when the auth probe fails.
    pub async fn setup_entry(&self, credentials: Credentials) -> Result<EntityState, SetupError> {
        if self.is_configured(&credentials.user_id).await {
            return Err(SetupError::AlreadyConfigured(credentials.user_id));
        }

        let api = self.connector.connect(&credentials);
        let identity = match api.auth_test().await {
            Ok(identity) => identity,
            Err(source) => {
                let hint = token_kind_hint(credentials.token.expose_secret());
                error!(
                    event_name = "integration.setup.auth_failed",
                    account = %credentials.display_name,
                    error = %source,
                    hint,
                    "error setting up slack user entry"
                );
                return Err(SetupError::AuthCheck {
                    name: credentials.display_name,
                    source,
                    hint,
                });
            }
        };

        if identity.user_id != credentials.user_id.0 {
            warn!(
                event_name = "integration.setup.identity_mismatch",
                account = %credentials.display_name,
                configured_user_id = %credentials.user_id,
                token_user_id = %identity.user_id,
                "token belongs to a different slack user than configured"
            );
        }

        // The id is picked and claimed under one write lock so concurrent
        // setups never share it.
        let (entity_id, entity) = {
            let mut entities = self.entities.write().await;
            if entities.iter().any(|registered| registered.unique_id == credentials.user_id) {
                return Err(SetupError::AlreadyConfigured(credentials.user_id));
            }
            let entity_id = allocate_entity_id(&entities, &credentials.display_name);
            let entity =
                Arc::new(Mutex::new(StatusEntity::new(&credentials, entity_id.clone(), api)));
            entities.push(RegisteredEntity {
                unique_id: credentials.user_id.clone(),
                entity_id: entity_id.clone(),
                entity: entity.clone(),
            });
            (entity_id, entity)
        };

        let snapshot = {
            let mut entity = entity.lock().await;
            if let Err(error) = entity.refresh().await {
                warn!(
                    event_name = "integration.setup.initial_refresh_failed",
                    entity_id = %entity_id,
                    error = %error,
                    "initial profile refresh failed; entity starts without profile fields"
                );
            }
            entity.snapshot()
        };

        self.register_services().await;

        info!(
            event_name = "integration.setup.completed",
            entity_id = %entity_id,
            unique_id = %credentials.user_id,
            team = identity.team.as_deref().unwrap_or("unknown"),
            "slack user entity registered"
        );

        Ok(snapshot)
    }

    /// Drops the entity for `user_id`. Services go away with the last entity.
    pub async fn unload_entry(&self, user_id: &UserId) -> bool {
        let remaining = {
            let mut entities = self.entities.write().await;
            let before = entities.len();
            entities.retain(|registered| &registered.unique_id != user_id);
            if entities.len() == before {
                return false;
            }
            entities.len()
        };

        info!(
            event_name = "integration.unload.completed",
            unique_id = %user_id,
            "slack user entity removed"
        );

        if remaining == 0 {
            let mut services = self.services.write().await;
            for service in ServiceName::ALL {
                services.unregister(service);
            }
            debug!(
                event_name = "integration.services.unregistered",
                domain = DOMAIN,
                "services removed with the last entity"
            );
        }

        true
    }

    /// Runs a service call. Targets are processed one after another in
    /// registration order; a failing entity does not stop the rest.
    pub async fn handle(
        &self,
        service: &str,
        payload: &Value,
    ) -> Result<DispatchReport, DispatchError> {
        let name = ServiceName::parse(service)
            .ok_or_else(|| DispatchError::UnknownService(service.to_owned()))?;
        if !self.services.read().await.contains(name) {
            return Err(DispatchError::UnknownService(service.to_owned()));
        }

        let call = ServiceCall::parse(name, payload)
            .map_err(|source| DispatchError::InvalidPayload { service: name, source })?;
        Ok(self.dispatch(call).await)
    }

    async fn dispatch(&self, call: ServiceCall) -> DispatchReport {
        let service = call.service();
        let targets = self.resolve(call.target()).await;

        let mut report = DispatchReport {
            service,
            targeted: Vec::with_capacity(targets.len()),
            failures: Vec::new(),
        };
        if targets.is_empty() {
            debug!(
                event_name = "service.dispatch.no_targets",
                service = %service,
                "no entities matched; nothing to do"
            );
            return report;
        }

        let update = call.update();
        for (entity_id, entity) in targets {
            report.targeted.push(entity_id);
            let mut entity = entity.lock().await;
            if let Err(failure) = entity.set_status(&update).await {
                report.failures.push(failure);
            }
        }

        info!(
            event_name = "service.dispatch.completed",
            service = %service,
            targeted = report.targeted.len(),
            failed = report.failures.len(),
            "service call handled"
        );
        report
    }

    pub async fn entity_states(&self) -> Vec<EntityState> {
        let handles: Vec<_> = {
            let entities = self.entities.read().await;
            entities.iter().map(|registered| registered.entity.clone()).collect()
        };

        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(handle.lock().await.snapshot());
        }
        states
    }

    pub async fn services(&self) -> Vec<ServiceName> {
        self.services.read().await.names()
    }

    pub async fn summary(&self) -> IntegrationSummary {
        IntegrationSummary {
            domain: DOMAIN,
            services: self.services().await.iter().map(ServiceName::as_str).collect(),
            entities: self.entity_states().await,
        }
    }

    async fn is_configured(&self, user_id: &UserId) -> bool {
        self.entities.read().await.iter().any(|registered| &registered.unique_id == user_id)
    }

    async fn register_services(&self) {
        let mut services = self.services.write().await;
        for service in ServiceName::ALL {
            if services.register(service) {
                info!(
                    event_name = "integration.services.registered",
                    service = %service,
                    "service registered"
                );
            }
        }
    }

    async fn resolve(&self, target: &EntityTarget) -> Vec<(EntityId, Arc<Mutex<StatusEntity>>)> {
        let entities = self.entities.read().await;
        match target {
            EntityTarget::All => entities
                .iter()
                .map(|registered| (registered.entity_id.clone(), registered.entity.clone()))
                .collect(),
            EntityTarget::Ids(ids) => {
                let unknown: Vec<&str> = ids
                    .iter()
                    .filter(|id| !entities.iter().any(|registered| &registered.entity_id == *id))
                    .map(EntityId::as_str)
                    .collect();
                if !unknown.is_empty() {
                    debug!(
                        event_name = "service.dispatch.unknown_entities",
                        entity_ids = ?unknown,
                        "ignoring entity ids this integration does not own"
                    );
                }

                entities
                    .iter()
                    .filter(|registered| ids.contains(&registered.entity_id))
                    .map(|registered| (registered.entity_id.clone(), registered.entity.clone()))
                    .collect()
            }
        }
    }
}

/// Profile writes need a user token; bot and app tokens fail `auth.test` or
/// lack the scope.
fn token_kind_hint(token: &str) -> &'static str {
    if token.starts_with("xoxb-") || token.starts_with("xapp-") {
        " (hint: profile status needs a user token, not a bot or app token)"
    } else {
        ""
    }
}

fn allocate_entity_id(entities: &[RegisteredEntity], display_name: &str) -> EntityId {
    let taken = |candidate: &EntityId| {
        entities.iter().any(|registered| &registered.entity_id == candidate)
    };

    let base = EntityId::for_display_name(display_name);
    if !taken(&base) {
        return base;
    }
    let mut ordinal = 2;
    loop {
        let candidate = base.with_suffix(ordinal);
        if !taken(&candidate) {
            return candidate;
        }
        ordinal += 1;
    }
}
