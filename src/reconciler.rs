//! Joins host `update.*` entities with the containers and triggers known to WUD.
//!
//! Everything in here is pure: the same inputs always give the same view models.
use crate::config::Config;
use crate::matcher::fuzzy_contains;
use crate::models::{
    ContainerRecord, EntityId, EntityState, HostEntity, HostStates, TriggerRecord,
};
use crate::registry::RegistrySnapshot;
use crate::release_notes;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const ENTITY_DOMAIN: &str = "update.";

/// Checked in order, the first matching prefix is stripped.
const NAME_PREFIXES: [&str; 3] = [
    "update.whats_up_docker_container_",
    "update.wud_container_",
    "update.",
];

pub const DEFAULT_ICONS: [(&str, &str); 2] = [
    ("mosquitto", "mdi:message-outline"),
    ("traefik", "mdi:router-network"),
];
pub const FALLBACK_ICON: &str = "mdi:docker";

/// What the user can do about an entity.
#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "kind", content = "triggers", rename_all = "snake_case")]
pub enum UpdateAction {
    /// Update buttons are switched off or no WUD API is configured.
    Hidden,
    /// No trigger is known for the container.
    Unavailable,
    Single(TriggerRecord),
    /// Several triggers, the user picks one.
    Menu(Vec<TriggerRecord>),
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct EntityViewModel {
    pub entity_id: EntityId,
    pub state: EntityState,
    pub installed_version: Option<String>,
    pub latest_version: Option<String>,
    pub name: String,
    pub icon: String,
    pub triggers: Vec<TriggerRecord>,
    pub is_updating: bool,
    pub release_notes: Option<String>,
    pub action: UpdateAction,
}

/// View models split into entities with an update and entities that are up to date, each
/// sorted by display name.
#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct Reconciliation {
    pub updates: Vec<EntityViewModel>,
    pub current: Vec<EntityViewModel>,
}

/// Keep `update.*` entities whose id contains at least one of `filters`.
pub fn select_entities(states: &HostStates, filters: &[String]) -> Vec<HostEntity> {
    let mut entities: Vec<HostEntity> = states
        .iter()
        .filter(|(id, _)| id.starts_with(ENTITY_DOMAIN))
        .filter(|(id, _)| filters.iter().any(|f| id.contains(f.as_str())))
        .map(|(id, state)| HostEntity {
            id: id.clone(),
            state: state.state.clone(),
            attributes: state.attributes.clone(),
        })
        .collect();
    entities.sort_by(|a, b| a.id.cmp(&b.id));
    entities
}

/// First container, in registry order, whose name fuzzily matches `entity_id`.
pub fn match_entity_to_container<'a>(
    entity_id: &str,
    registry: &'a RegistrySnapshot,
) -> Option<&'a ContainerRecord> {
    registry
        .containers()
        .iter()
        .find(|container| fuzzy_contains(entity_id, &container.name))
}

/// Display name of an entity: the container name if matched, else a label derived from the id.
pub fn derive_name(entity_id: &str, matched: Option<&ContainerRecord>) -> String {
    if let Some(container) = matched {
        return container.name.clone();
    }
    let name = NAME_PREFIXES
        .iter()
        .find_map(|prefix| entity_id.strip_prefix(prefix))
        .unwrap_or(entity_id);
    let name = name.strip_prefix("local_").unwrap_or(name);
    strip_numeric_suffix(name)
        .replace('_', " ")
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

// "foo_bar_3" -> "foo_bar"
fn strip_numeric_suffix(name: &str) -> &str {
    if let Some((head, tail)) = name.rsplit_once('_')
        && !tail.is_empty()
        && tail.bytes().all(|b| b.is_ascii_digit())
    {
        return head;
    }
    name
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Icon for a display name. Configured icons win over the built-in ones; within each map the
/// first key contained in the lowercased name is used.
pub fn derive_icon(
    name: &str,
    custom_icons: &BTreeMap<String, String>,
    default_icons: &[(&str, &str)],
) -> String {
    let name = name.to_lowercase();
    custom_icons
        .iter()
        .map(|(key, icon)| (key.as_str(), icon.as_str()))
        .chain(default_icons.iter().copied())
        .find(|(key, _)| name.contains(&key.to_lowercase()))
        .map_or(FALLBACK_ICON, |(_, icon)| icon)
        .to_string()
}

pub fn derive_triggers(entity_id: &str, registry: &RegistrySnapshot) -> Vec<TriggerRecord> {
    match_entity_to_container(entity_id, registry)
        .and_then(|container| registry.triggers(&container.id))
        .map(<[TriggerRecord]>::to_vec)
        .unwrap_or_default()
}

fn derive_action(triggers: &[TriggerRecord], config: &Config) -> UpdateAction {
    if !config.updates_enabled() {
        return UpdateAction::Hidden;
    }
    match triggers {
        [] => UpdateAction::Unavailable,
        [single] => UpdateAction::Single(single.clone()),
        many => UpdateAction::Menu(many.to_vec()),
    }
}

pub fn build_view_model(
    entity: &HostEntity,
    registry: &RegistrySnapshot,
    in_flight: &HashSet<EntityId>,
    config: &Config,
) -> EntityViewModel {
    let matched = match_entity_to_container(&entity.id, registry);
    let name = derive_name(&entity.id, matched);
    let icon = derive_icon(&name, &config.custom_icons, &DEFAULT_ICONS);
    let triggers = derive_triggers(&entity.id, registry);
    let release_notes = release_notes::resolve(&name, &entity.attributes, &config.release_notes);
    let action = derive_action(&triggers, config);
    EntityViewModel {
        entity_id: entity.id.clone(),
        state: entity.state.clone(),
        installed_version: entity.attributes.installed_version.clone(),
        latest_version: entity.attributes.latest_version.clone(),
        name,
        icon,
        triggers,
        is_updating: in_flight.contains(&entity.id),
        release_notes,
        action,
    }
}

/// Lowercase base letters: "Éclair" -> "eclair".
fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Orders display names by their base letters ignoring case and accents, ties broken by the
/// lowercased and then the raw names.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

/// Build view models for all `entities` and partition them by state. Entities that are
/// neither `on` nor `off` appear in neither list.
pub fn reconcile(
    entities: &[HostEntity],
    registry: &RegistrySnapshot,
    in_flight: &HashSet<EntityId>,
    config: &Config,
) -> Reconciliation {
    let mut models: Vec<EntityViewModel> = entities
        .iter()
        .map(|entity| build_view_model(entity, registry, in_flight, config))
        .collect();
    models.sort_by(|a, b| compare_names(&a.name, &b.name));

    let mut reconciliation = Reconciliation::default();
    for model in models {
        match model.state {
            EntityState::On => reconciliation.updates.push(model),
            EntityState::Off => reconciliation.current.push(model),
            EntityState::Other(_) => {}
        }
    }
    reconciliation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WudApiConfig;
    use crate::models::HostEntityState;
    use std::collections::HashMap;

    fn registry(
        containers: &[(&str, &str)],
        triggers: &[(&str, &[TriggerRecord])],
    ) -> RegistrySnapshot {
        RegistrySnapshot::new(
            containers
                .iter()
                .map(|(id, name)| ContainerRecord::new(*id, *name))
                .collect(),
            triggers
                .iter()
                .map(|(id, t)| (id.to_string(), t.to_vec()))
                .collect(),
        )
    }

    fn config_with_api() -> Config {
        Config {
            wud_api: Some(WudApiConfig {
                url: "http://wud.local:3000".parse().unwrap(),
                auth: None,
                show_update_buttons: true,
                request_timeout_ms: 1_000,
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_match_entity_to_container() {
        let registry = registry(&[("1", "mosquitto-broker"), ("2", "traefik")], &[]);
        let matched = match_entity_to_container("update.mosquitto_broker_2", &registry);
        assert_eq!(matched.map(|c| c.id.as_str()), Some("1"));
        assert!(match_entity_to_container("update.grafana", &registry).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let registry = registry(&[("1", "traefik"), ("2", "traefik-internal")], &[]);
        let matched = match_entity_to_container("update.traefik_internal", &registry);
        assert_eq!(matched.map(|c| c.id.as_str()), Some("1"));
    }

    #[test]
    fn test_derive_name_without_registry() {
        assert_eq!(derive_name("update.local_foo_bar_3", None), "Foo Bar");
        assert_eq!(
            derive_name("update.whats_up_docker_container_local_home_assistant", None),
            "Home Assistant"
        );
        assert_eq!(derive_name("update.wud_container_traefik_10", None), "Traefik");
        assert_eq!(derive_name("update.ZIGBEE2MQTT", None), "Zigbee2mqtt");
        assert_eq!(derive_name("sensor.odd_v2", None), "Sensor.odd V2");
    }

    #[test]
    fn test_derive_name_prefers_container() {
        let container = ContainerRecord::new("1", "mosquitto-broker");
        assert_eq!(
            derive_name("update.mosquitto_broker_2", Some(&container)),
            "mosquitto-broker"
        );
    }

    #[test]
    fn test_derive_icon() {
        let mut custom = BTreeMap::new();
        assert_eq!(derive_icon("Traefik", &custom, &DEFAULT_ICONS), "mdi:router-network");
        assert_eq!(derive_icon("grafana", &custom, &DEFAULT_ICONS), FALLBACK_ICON);

        custom.insert("TRAEFIK".to_string(), "mdi:custom".to_string());
        assert_eq!(derive_icon("traefik-proxy", &custom, &DEFAULT_ICONS), "mdi:custom");
    }

    #[test]
    fn test_derive_triggers() {
        let triggers = [
            TriggerRecord::new("docker.local", "local", "docker"),
            TriggerRecord::new("dockercompose.stack", "stack", "dockercompose"),
        ];
        let registry = registry(
            &[("1", "mosquitto"), ("2", "traefik")],
            &[("1", &triggers[..])],
        );
        assert_eq!(derive_triggers("update.mosquitto", &registry), triggers.to_vec());
        // container known but triggers not loaded
        assert!(derive_triggers("update.traefik", &registry).is_empty());
        assert!(derive_triggers("update.grafana", &registry).is_empty());
    }

    #[test]
    fn test_update_actions() {
        let one = [TriggerRecord::new("docker.local", "local", "docker")];
        let two = [
            TriggerRecord::new("docker.local", "local", "docker"),
            TriggerRecord::new("ntfy.main", "main", "ntfy"),
        ];
        let registry = registry(
            &[("1", "mosquitto"), ("2", "traefik"), ("3", "grafana")],
            &[("1", &one[..]), ("2", &two[..])],
        );
        let config = config_with_api();
        let in_flight = HashSet::new();
        let action = |id: &str| {
            build_view_model(
                &HostEntity::new(id, EntityState::On),
                &registry,
                &in_flight,
                &config,
            )
            .action
        };
        assert_eq!(action("update.mosquitto"), UpdateAction::Single(one[0].clone()));
        assert_eq!(action("update.traefik"), UpdateAction::Menu(two.to_vec()));
        assert_eq!(action("update.grafana"), UpdateAction::Unavailable);

        let hidden = build_view_model(
            &HostEntity::new("update.mosquitto", EntityState::On),
            &registry,
            &in_flight,
            &Config::default(),
        );
        assert_eq!(hidden.action, UpdateAction::Hidden);
    }

    #[test]
    fn test_build_view_model_is_repeatable() {
        let triggers = [TriggerRecord::new("docker.local", "local", "docker")];
        let registry = registry(&[("1", "mosquitto-broker")], &[("1", &triggers[..])]);
        let mut config = config_with_api();
        config
            .release_notes
            .insert("mosquitto".to_string(), "https://x/{version}".to_string());
        let in_flight = HashSet::from(["update.mosquitto_broker_2".to_string()]);
        let entity = HostEntity::new("update.mosquitto_broker_2", EntityState::On)
            .with_versions(Some("2.0"), Some("2.1"));

        let first = build_view_model(&entity, &registry, &in_flight, &config);
        let second = build_view_model(&entity, &registry, &in_flight, &config);
        assert_eq!(first, second);
        assert_eq!(first.name, "mosquitto-broker");
        assert_eq!(first.icon, "mdi:message-outline");
        assert!(first.is_updating);
        assert_eq!(first.release_notes.as_deref(), Some("https://x/2.1"));
    }

    #[test]
    fn test_reconcile_partitions_and_sorts() {
        let entities = [
            HostEntity::new("update.wud_container_zulu", EntityState::On),
            HostEntity::new("update.wud_container_alpha", EntityState::Off),
            HostEntity::new("update.wud_container_bravo", EntityState::On),
            HostEntity::new("update.wud_container_delta", EntityState::Other("unavailable".into())),
            HostEntity::new("update.wud_container_Charlie", EntityState::Off),
        ];
        let registry = registry(&[("1", "bravo")], &[]);
        let result = reconcile(&entities, &registry, &HashSet::new(), &Config::default());

        let names = |models: &[EntityViewModel]| {
            models.iter().map(|m| m.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&result.updates), vec!["bravo", "Zulu"]);
        assert_eq!(names(&result.current), vec!["Alpha", "Charlie"]);
    }

    #[test]
    fn test_reconcile_sorts_accented_names() {
        let entities = [
            HostEntity::new("update.wud_container_zulu", EntityState::On),
            HostEntity::new("update.wud_container_éclair", EntityState::On),
            HostEntity::new("update.wud_container_apple", EntityState::On),
            HostEntity::new("update.wud_container_eclair", EntityState::On),
        ];
        let result = reconcile(
            &entities,
            &RegistrySnapshot::default(),
            &HashSet::new(),
            &Config::default(),
        );
        let names: Vec<_> = result.updates.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Eclair", "Éclair", "Zulu"]);
    }

    #[test]
    fn test_compare_names() {
        assert_eq!(compare_names("Ärger", "Zebra"), Ordering::Less);
        assert_eq!(compare_names("apple", "Apple"), Ordering::Greater);
        assert_eq!(compare_names("Éclair", "Éclair"), Ordering::Equal);
    }

    #[test]
    fn test_select_entities() {
        let state = HostEntityState {
            state: EntityState::On,
            attributes: Default::default(),
        };
        let states: HostStates = HashMap::from([
            ("update.wud_container_traefik".to_string(), state.clone()),
            ("update.whats_up_docker_container_mosquitto".to_string(), state.clone()),
            ("update.home_assistant_core".to_string(), state.clone()),
            ("sensor.wud_container_count".to_string(), state.clone()),
        ]);
        let filters = vec!["whats_up_docker".to_string(), "wud_container".to_string()];
        let ids: Vec<_> = select_entities(&states, &filters)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "update.whats_up_docker_container_mosquitto",
                "update.wud_container_traefik"
            ]
        );
    }
}
