use crate::models::EntityId;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Everything the core tells the presentation layer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DashboardEvent {
    Notify(Notification),
    /// Close any open trigger selection menu.
    CloseMenus,
    /// State changed, the view should be rebuilt.
    Render,
    /// The host should open its details dialog for this entity.
    MoreInfo(EntityId),
}

impl From<Notification> for DashboardEvent {
    fn from(value: Notification) -> Self {
        DashboardEvent::Notify(value)
    }
}

pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: DashboardEvent) -> impl Future<Output = ()> + Send;

    fn notify(
        &self,
        severity: Severity,
        message: impl Into<String>,
    ) -> impl Future<Output = ()> + Send {
        self.emit(Notification::new(severity, message).into())
    }
}

/// Forwards events into a channel drained by [`start_event_handler`].
#[derive(Clone)]
pub struct EventHandler {
    tx: Sender<DashboardEvent>,
}

impl EventHandler {
    pub fn new(tx: Sender<DashboardEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for EventHandler {
    async fn emit(&self, event: DashboardEvent) {
        if let Err(e) = self.tx.send(event).await {
            warn!("dropping event, receiver closed: {:?}", e.0);
        }
    }
}

pub async fn start_event_handler(mut rx: Receiver<DashboardEvent>) {
    while let Some(event) = rx.recv().await {
        log_event(&event);
    }
}

fn log_event(event: &DashboardEvent) {
    match event {
        DashboardEvent::Notify(Notification {
            message,
            severity: Severity::Error,
        }) => error!("{message}"),
        DashboardEvent::Notify(Notification { message, severity }) => {
            info!("[{severity}] {message}")
        }
        DashboardEvent::MoreInfo(entity_id) => info!("more info requested for {entity_id}"),
        DashboardEvent::CloseMenus | DashboardEvent::Render => debug!("{event:?}"),
    }
}
