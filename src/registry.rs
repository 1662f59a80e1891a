use crate::models::{ContainerId, ContainerRecord, TriggerRecord};
use crate::wud::{ApiError, WudApi};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("WUD not reachable: {0}")]
    Unreachable(#[from] ApiError),
}

/// Containers in the order WUD returned them, plus the triggers fetched per container.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    containers: Vec<ContainerRecord>,
    triggers: HashMap<ContainerId, Vec<TriggerRecord>>,
}

impl RegistrySnapshot {
    pub fn new(
        containers: Vec<ContainerRecord>,
        triggers: HashMap<ContainerId, Vec<TriggerRecord>>,
    ) -> Self {
        Self {
            containers,
            triggers,
        }
    }

    pub fn containers(&self) -> &[ContainerRecord] {
        &self.containers
    }

    pub fn container(&self, container_id: &str) -> Option<&ContainerRecord> {
        self.containers.iter().find(|c| c.id == container_id)
    }

    /// `None` if the triggers of this container were never fetched or failed to load.
    pub fn triggers(&self, container_id: &str) -> Option<&[TriggerRecord]> {
        self.triggers.get(container_id).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Outcome of a successful [`ContainerRegistry::refresh`].
#[derive(Debug)]
pub struct RefreshReport {
    pub containers: usize,
    pub trigger_failures: Vec<(ContainerId, ApiError)>,
}

/// Cache of the containers and triggers known to WUD.
///
/// Only [`ContainerRegistry::refresh`] writes. Readers take a [`RegistrySnapshot`].
#[derive(Clone, Default)]
pub struct ContainerRegistry {
    state: Arc<RwLock<RegistrySnapshot>>,
    refreshing: Arc<Mutex<()>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.clone()
    }

    /// Replace the cached containers with the current list from WUD, then load the triggers of
    /// every container concurrently.
    ///
    /// If the container list cannot be fetched the cache is left untouched. A container whose
    /// triggers fail to load ends up without a trigger entry.
    pub async fn refresh<A: WudApi>(&self, api: &A) -> Result<RefreshReport, FetchError> {
        let _refreshing = self.refreshing.lock().await;

        let containers = api
            .containers()
            .await
            .inspect_err(|e| warn!("WUD API not reachable: {e}"))?;
        debug!("fetched {} containers", containers.len());
        {
            let mut state = self.state.write().await;
            *state = RegistrySnapshot::new(containers.clone(), HashMap::new());
        }

        let mut pending: FuturesUnordered<_> = containers
            .iter()
            .map(|container| async move {
                (container.id.clone(), api.triggers(&container.id).await)
            })
            .collect();

        let mut trigger_failures = Vec::new();
        while let Some((container_id, result)) = pending.next().await {
            match result {
                Ok(triggers) => {
                    self.state
                        .write()
                        .await
                        .triggers
                        .insert(container_id, triggers);
                }
                Err(e) => {
                    warn!("Failed to load triggers for {container_id}: {e}");
                    trigger_failures.push((container_id, e));
                }
            }
        }

        info!(
            "registry refreshed: {} containers, {} trigger lookups failed",
            containers.len(),
            trigger_failures.len()
        );
        Ok(RefreshReport {
            containers: containers.len(),
            trigger_failures,
        })
    }
}
