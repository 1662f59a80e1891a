use crate::config::Config;
use crate::gate::RefreshGate;
use crate::models::{HostEntity, HostStates};
use crate::notifications::{DashboardEvent, EventSink};
use crate::orchestrator::{InFlightSet, UpdateError, UpdateOrchestrator};
use crate::reconciler::{EntityViewModel, reconcile, select_entities};
use crate::registry::ContainerRegistry;
use crate::wud::{ApiError, WudApi};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Time WUD gets to finish a check before the registry is refreshed again.
pub const CHECK_SETTLE_DELAY: Duration = Duration::from_secs(3);

#[derive(Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No WUD API configured or update buttons switched off.
    Disabled,
    /// No refresh attempted yet.
    Unknown,
    Connected,
    Unreachable,
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct DashboardView {
    pub title: String,
    pub connectivity: Connectivity,
    pub show_check_button: bool,
    pub updates_count: usize,
    pub current_count: usize,
    pub current_collapsed: bool,
    pub updates: Vec<EntityViewModel>,
    pub current: Vec<EntityViewModel>,
}

/// Ties the registry, the refresh gate and the orchestrator to the stream of host updates.
pub struct Dashboard<A: WudApi, S: EventSink> {
    config: Arc<Config>,
    api: Option<Arc<A>>,
    registry: ContainerRegistry,
    orchestrator: Option<UpdateOrchestrator<A, S>>,
    events: Arc<S>,
    in_flight: InFlightSet,
    gate: RefreshGate,
    connectivity: Connectivity,
    entities: Vec<HostEntity>,
    fingerprint: Option<String>,
    settle_delay: Duration,
}

impl<A: WudApi, S: EventSink> Dashboard<A, S> {
    pub fn new(config: Arc<Config>, api: Option<Arc<A>>, events: Arc<S>) -> Self {
        let registry = ContainerRegistry::new();
        let in_flight = InFlightSet::new();
        let orchestrator = api.clone().map(|api| {
            UpdateOrchestrator::new(api, registry.clone(), in_flight.clone(), events.clone())
        });
        let connectivity = if config.updates_enabled() && api.is_some() {
            Connectivity::Unknown
        } else {
            Connectivity::Disabled
        };
        Self {
            gate: RefreshGate::new(config.update_interval),
            config,
            api,
            registry,
            orchestrator,
            events,
            in_flight,
            connectivity,
            entities: Vec::new(),
            fingerprint: None,
            settle_delay: CHECK_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Handle new host data received at `now` (unix millis).
    ///
    /// Refreshes the registry when the gate allows it. Returns a view if anything relevant
    /// changed, `None` otherwise.
    pub async fn on_host_update(&mut self, states: &HostStates, now: u64) -> Option<DashboardView> {
        let entities = select_entities(states, &self.config.entity_filter);
        let fingerprint = serde_json::to_string(&entities).unwrap_or_default();

        if self.gate.should_refresh(now) {
            self.gate.mark_refreshed(now);
            self.entities = entities;
            self.fingerprint = Some(fingerprint);
            self.refresh_registry().await;
            return Some(self.view().await);
        }
        if self.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            debug!("no relevant changes");
            return None;
        }
        self.entities = entities;
        self.fingerprint = Some(fingerprint);
        Some(self.view().await)
    }

    async fn refresh_registry(&mut self) {
        if !self.config.updates_enabled() {
            return;
        }
        let Some(api) = &self.api else {
            return;
        };
        self.connectivity = match self.registry.refresh(api.as_ref()).await {
            Ok(_) => Connectivity::Connected,
            Err(_) => Connectivity::Unreachable,
        };
    }

    /// Current view built from the last host data, the registry and the in-flight set.
    pub async fn view(&self) -> DashboardView {
        let registry = self.registry.snapshot().await;
        let reconciliation = reconcile(
            &self.entities,
            &registry,
            &self.in_flight.snapshot(),
            &self.config,
        );
        DashboardView {
            title: self.config.title().to_string(),
            connectivity: self.connectivity,
            show_check_button: self.config.updates_enabled(),
            updates_count: reconciliation.updates.len(),
            current_count: reconciliation.current.len(),
            current_collapsed: self.config.current_collapsed,
            updates: if self.config.show_available_updates {
                reconciliation.updates
            } else {
                Vec::new()
            },
            current: if self.config.show_current {
                reconciliation.current
            } else {
                Vec::new()
            },
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Ask WUD at `now` (unix millis) to check for new images. The first host update after
    /// the settle delay refreshes the registry.
    pub async fn check_for_updates(&mut self, now: u64) -> Result<(), ApiError> {
        let orchestrator = self.orchestrator.as_ref().ok_or(ApiError::NotConfigured)?;
        orchestrator.check_for_updates().await?;
        let due = now.saturating_add(self.settle_delay.as_millis() as u64);
        info!("registry refresh scheduled in {:?}", self.settle_delay);
        self.gate.refresh_at(due);
        Ok(())
    }

    /// Ask the host to show its details dialog for `entity_id`.
    pub async fn show_more_info(&self, entity_id: &str) {
        self.events
            .emit(DashboardEvent::MoreInfo(entity_id.to_string()))
            .await;
    }

    pub async fn trigger_update(&self, entity_id: &str, trigger_id: &str) -> Result<(), UpdateError> {
        let orchestrator = self
            .orchestrator
            .as_ref()
            .ok_or(UpdateError::TriggerRequestFailed(ApiError::NotConfigured))?;
        orchestrator.trigger_update(entity_id, trigger_id).await
    }
}
