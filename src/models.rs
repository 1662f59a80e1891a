use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

pub type EntityId = String;
pub type ContainerId = String;
pub type TriggerId = String;

pub const DEFAULT_WATCHER: &str = "docker.local";
pub const DEFAULT_REGISTRY: &str = "hub.public";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";
pub const DEFAULT_OS: &str = "linux";
pub const DEFAULT_TAG: &str = "latest";

/// State of an `update.*` entity as reported by the host platform.
#[derive(Deserialize, Serialize, Debug, Clone, Hash, Eq, PartialEq)]
#[serde(from = "String", into = "String")]
pub enum EntityState {
    /// An update is available.
    On,
    /// Up to date.
    Off,
    /// Anything else the host reports, e.g. `unavailable`.
    Other(String),
}

impl From<String> for EntityState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "on" => EntityState::On,
            "off" => EntityState::Off,
            _ => EntityState::Other(value),
        }
    }
}

impl From<EntityState> for String {
    fn from(value: EntityState) -> Self {
        value.to_string()
    }
}

impl Display for EntityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityState::On => write!(f, "on"),
            EntityState::Off => write!(f, "off"),
            EntityState::Other(other) => write!(f, "{other}"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct EntityAttributes {
    #[serde(default)]
    pub installed_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
}

/// One entry of the inbound host data.
#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
pub struct HostEntityState {
    pub state: EntityState,
    #[serde(default)]
    pub attributes: EntityAttributes,
}

/// Inbound host data keyed by entity id.
pub type HostStates = HashMap<EntityId, HostEntityState>;

/// Immutable snapshot of one host entity for a single reconciliation pass.
#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct HostEntity {
    pub id: EntityId,
    pub state: EntityState,
    pub attributes: EntityAttributes,
}

impl HostEntity {
    pub fn new(id: impl Into<EntityId>, state: EntityState) -> Self {
        Self {
            id: id.into(),
            state,
            attributes: EntityAttributes::default(),
        }
    }

    pub fn with_versions(mut self, installed: Option<&str>, latest: Option<&str>) -> Self {
        self.attributes.installed_version = installed.map(str::to_string);
        self.attributes.latest_version = latest.map(str::to_string);
        self
    }
}

/// A container as known by What's Up Docker.
///
/// Apart from `id` and `name` every field is passed through untouched and only consulted
/// when building a [`TriggerPayload`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: ContainerId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_kind: Option<Value>,
}

impl ContainerRecord {
    pub fn new(id: impl Into<ContainerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            watcher: None,
            image: None,
            registry: None,
            architecture: None,
            os: None,
            tag: None,
            update_kind: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
pub struct TriggerRecord {
    pub id: TriggerId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TriggerRecord {
    pub fn new(id: impl Into<TriggerId>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Body of `POST /api/triggers/{type}/{name}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub id: ContainerId,
    pub name: String,
    pub watcher: Value,
    pub image: Value,
    pub registry: Value,
    pub architecture: Value,
    pub os: Value,
    pub tag: Value,
    pub update_kind: Value,
}

// null, "", false and 0 count as missing
fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    })
}

impl From<&ContainerRecord> for TriggerPayload {
    fn from(container: &ContainerRecord) -> Self {
        let tag = present(&container.tag).cloned();
        let update_kind = present(&container.update_kind).cloned().unwrap_or_else(|| {
            json!({
                "kind": "tag",
                "semverDiff": "patch",
                "localValue": tag.clone().unwrap_or_else(|| json!("current")),
                "remoteValue": "latest",
            })
        });
        Self {
            id: container.id.clone(),
            name: container.name.clone(),
            watcher: present(&container.watcher)
                .cloned()
                .unwrap_or_else(|| json!(DEFAULT_WATCHER)),
            image: present(&container.image)
                .cloned()
                .unwrap_or_else(|| json!({ "name": container.name })),
            registry: present(&container.registry)
                .cloned()
                .unwrap_or_else(|| json!({ "name": DEFAULT_REGISTRY })),
            architecture: present(&container.architecture)
                .cloned()
                .unwrap_or_else(|| json!(DEFAULT_ARCHITECTURE)),
            os: present(&container.os)
                .cloned()
                .unwrap_or_else(|| json!(DEFAULT_OS)),
            tag: tag.unwrap_or_else(|| json!(DEFAULT_TAG)),
            update_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_defaults() {
        let container = ContainerRecord::new("abc", "mosquitto");
        let payload = TriggerPayload::from(&container);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "id": "abc",
                "name": "mosquitto",
                "watcher": "docker.local",
                "image": {"name": "mosquitto"},
                "registry": {"name": "hub.public"},
                "architecture": "amd64",
                "os": "linux",
                "tag": "latest",
                "updateKind": {
                    "kind": "tag",
                    "semverDiff": "patch",
                    "localValue": "current",
                    "remoteValue": "latest"
                }
            })
        );
    }

    #[test]
    fn test_payload_keeps_container_fields() {
        let container: ContainerRecord = serde_json::from_value(json!({
            "id": "abc",
            "name": "traefik",
            "watcher": "docker.remote",
            "image": {"name": "library/traefik", "tag": {"value": "3.0"}},
            "os": "",
            "tag": "3.0",
            "status": "running"
        }))
        .unwrap();
        let payload = TriggerPayload::from(&container);
        assert_eq!(payload.watcher, json!("docker.remote"));
        assert_eq!(payload.image["name"], json!("library/traefik"));
        // empty strings fall back to the default
        assert_eq!(payload.os, json!("linux"));
        assert_eq!(payload.tag, json!("3.0"));
        assert_eq!(payload.update_kind["localValue"], json!("3.0"));
    }

    #[test]
    fn test_entity_state_from_host() {
        let state: HostEntityState = serde_json::from_value(json!({
            "state": "on",
            "attributes": {"installed_version": "1.0", "friendly_name": "ignored"}
        }))
        .unwrap();
        assert_eq!(state.state, EntityState::On);
        assert_eq!(state.attributes.installed_version.as_deref(), Some("1.0"));
        assert_eq!(state.attributes.latest_version, None);

        let state: HostEntityState =
            serde_json::from_value(json!({"state": "unavailable"})).unwrap();
        assert_eq!(state.state, EntityState::Other("unavailable".to_string()));
    }

    #[test]
    fn test_trigger_type_field() {
        let trigger: TriggerRecord = serde_json::from_value(json!({
            "id": "docker.local",
            "name": "local",
            "type": "docker"
        }))
        .unwrap();
        assert_eq!(trigger.kind, "docker");
    }
}
