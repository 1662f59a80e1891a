use crate::models::{EntityId, TriggerPayload};
use crate::notifications::{DashboardEvent, EventSink, Severity};
use crate::reconciler::{derive_name, match_entity_to_container};
use crate::registry::ContainerRegistry;
use crate::wud::{ApiError, WudApi};
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Container not found for {0}")]
    ContainerNotFound(EntityId),
    #[error("Trigger {trigger} not found for {entity}")]
    TriggerNotFound { entity: EntityId, trigger: String },
    #[error("update of {0} already in progress")]
    AlreadyUpdating(EntityId),
    #[error("Update failed: {0}")]
    TriggerRequestFailed(#[from] ApiError),
}

/// Entities with an update request on the way.
#[derive(Clone, Default, Debug)]
pub struct InFlightSet {
    entities: Arc<Mutex<HashSet<EntityId>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<EntityId>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `entity_id` and return a guard removing it again on drop. `None` if the entity is
    /// already in flight.
    pub fn enter(&self, entity_id: &str) -> Option<InFlightGuard> {
        if !self.lock().insert(entity_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            entity_id: entity_id.to_string(),
        })
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.lock().contains(entity_id)
    }

    pub fn snapshot(&self) -> HashSet<EntityId> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    entity_id: EntityId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.entity_id);
        debug!("{} no longer in flight", self.entity_id);
    }
}

/// Drives update and check requests against WUD and reports their outcome.
pub struct UpdateOrchestrator<A: WudApi, S: EventSink> {
    api: Arc<A>,
    registry: ContainerRegistry,
    in_flight: InFlightSet,
    events: Arc<S>,
}

impl<A: WudApi, S: EventSink> Clone for UpdateOrchestrator<A, S> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            registry: self.registry.clone(),
            in_flight: self.in_flight.clone(),
            events: self.events.clone(),
        }
    }
}

impl<A: WudApi, S: EventSink> UpdateOrchestrator<A, S> {
    pub fn new(
        api: Arc<A>,
        registry: ContainerRegistry,
        in_flight: InFlightSet,
        events: Arc<S>,
    ) -> Self {
        Self {
            api,
            registry,
            in_flight,
            events,
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Run `trigger_id` for the container matching `entity_id`.
    ///
    /// The entity is marked in flight before the request is sent and unmarked once it
    /// finished, whatever the outcome. Failures are reported and never retried.
    pub async fn trigger_update(&self, entity_id: &str, trigger_id: &str) -> Result<(), UpdateError> {
        let snapshot = self.registry.snapshot().await;
        let Some(container) = match_entity_to_container(entity_id, &snapshot) else {
            self.events
                .notify(Severity::Error, "Container not found")
                .await;
            return Err(UpdateError::ContainerNotFound(entity_id.to_string()));
        };
        let Some(trigger) = snapshot
            .triggers(&container.id)
            .unwrap_or_default()
            .iter()
            .find(|t| t.id == trigger_id)
        else {
            self.events.notify(Severity::Error, "Trigger not found").await;
            return Err(UpdateError::TriggerNotFound {
                entity: entity_id.to_string(),
                trigger: trigger_id.to_string(),
            });
        };

        let Some(guard) = self.in_flight.enter(entity_id) else {
            debug!("{entity_id} is already updating, ignoring request");
            return Err(UpdateError::AlreadyUpdating(entity_id.to_string()));
        };
        self.events.emit(DashboardEvent::Render).await;

        let name = derive_name(entity_id, Some(container));
        self.events
            .notify(Severity::Info, format!("Starting update for {name}..."))
            .await;

        let payload = TriggerPayload::from(container);
        let result = self.api.run_trigger(trigger, &payload).await;
        match &result {
            Ok(()) => {
                info!("update of {name} triggered via {}/{}", trigger.kind, trigger.name);
                self.events
                    .notify(Severity::Success, format!("Update triggered for {name}"))
                    .await;
                self.events.emit(DashboardEvent::CloseMenus).await;
            }
            Err(e) => {
                error!("Trigger error for {entity_id}: {e}");
                self.events
                    .notify(Severity::Error, format!("Update failed: {e}"))
                    .await;
            }
        }
        drop(guard);
        self.events.emit(DashboardEvent::Render).await;

        result.map_err(UpdateError::from)
    }

    /// Ask WUD to check all containers for new images.
    pub async fn check_for_updates(&self) -> Result<(), ApiError> {
        self.events
            .notify(Severity::Info, "Checking containers for updates...")
            .await;
        match self.api.watch().await {
            Ok(()) => {
                self.events
                    .notify(Severity::Success, "Container check started")
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Check updates error: {e}");
                self.events
                    .notify(Severity::Error, format!("Check failed: {e}"))
                    .await;
                Err(e)
            }
        }
    }
}
