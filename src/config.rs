use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use figment2::{
    Figment,
    providers::{Env, Format, Toml},
};
use url::Url;

pub const DEFAULT_TITLE: &str = "Docker Container Updates";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment2::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WudApiConfig {
    pub url: Url,
    /// Bearer token. Blank values are treated as absent.
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_true")]
    pub show_update_buttons: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Falls back to [`DEFAULT_TITLE`].
    #[serde(default)]
    pub title: Option<String>,
    /// Substrings of which at least one must occur in an entity id.
    #[serde(default = "default_entity_filter")]
    pub entity_filter: Vec<String>,
    #[serde(default = "default_true")]
    pub show_current: bool,
    #[serde(default = "default_true")]
    pub show_available_updates: bool,
    #[serde(default = "default_true")]
    pub current_collapsed: bool,
    #[serde(default)]
    pub wud_api: Option<WudApiConfig>,
    /// Release notes url templates keyed by container name.
    #[serde(default)]
    pub release_notes: BTreeMap<String, String>,
    /// Icon overrides keyed by a case-insensitive name fragment.
    #[serde(default)]
    pub custom_icons: BTreeMap<String, String>,
    /// Minimum time between two registry refreshes in milliseconds.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
}

fn default_true() -> bool {
    true
}

fn default_entity_filter() -> Vec<String> {
    vec!["whats_up_docker".to_string(), "wud_container".to_string()]
}

fn default_update_interval() -> u64 {
    30_000
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: None,
            entity_filter: default_entity_filter(),
            show_current: true,
            show_available_updates: true,
            current_collapsed: true,
            wud_api: None,
            release_notes: BTreeMap::new(),
            custom_icons: BTreeMap::new(),
            update_interval: default_update_interval(),
        }
    }
}

impl Config {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// True if a WUD API is configured and update buttons are enabled.
    pub fn updates_enabled(&self) -> bool {
        self.wud_api
            .as_ref()
            .is_some_and(|api| api.show_update_buttons)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_filter.is_empty() {
            return Err(ConfigError::Invalid("entity_filter must not be empty".into()));
        }
        if self.entity_filter.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::Invalid(
                "entity_filter entries must not be empty".into(),
            ));
        }
        if self.update_interval == 0 {
            return Err(ConfigError::Invalid("update_interval must be > 0".into()));
        }
        if let Some(api) = &self.wud_api {
            if !matches!(api.url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "wud_api.url must be http or https, got {}",
                    api.url
                )));
            }
            if api.request_timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "wud_api.request_timeout_ms must be > 0".into(),
                ));
            }
        }
        if self.release_notes.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "release_notes keys must not be empty".into(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(config_path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("WUD_BRIDGE_").split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}
