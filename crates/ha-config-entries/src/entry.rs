//! A single integration configuration

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    SetupError,
    UnloadInProgress,
    FailedUnload,
}

impl ConfigEntryState {
    /// States from which the entry may be unloaded or reloaded
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConfigEntryState::NotLoaded | ConfigEntryState::Loaded | ConfigEntryState::SetupError
        )
    }
}

/// How the entry came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    #[default]
    User,
    Import,
    Discovery,
    Mqtt,
    Reconfigure,
}

impl ConfigEntrySource {
    /// Step a config flow starts at for this source
    pub fn initial_step(&self) -> &'static str {
        match self {
            ConfigEntrySource::User => "user",
            ConfigEntrySource::Import => "import",
            ConfigEntrySource::Discovery => "discovery",
            ConfigEntrySource::Mqtt => "mqtt",
            ConfigEntrySource::Reconfigure => "reconfigure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub title: String,

    /// Set at creation; changed only through reconfiguration
    #[serde(default)]
    pub data: HashMap<String, Value>,

    /// Edited through the options flow
    #[serde(default)]
    pub options: HashMap<String, Value>,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Why the last setup or unload failed
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_options(mut self, options: HashMap<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Partial update applied by [`crate::ConfigEntries::update`]
#[derive(Debug, Default, Clone)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub data: Option<HashMap<String, Value>>,
    pub options: Option<HashMap<String, Value>>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn options(mut self, options: HashMap<String, Value>) -> Self {
        self.options = Some(options);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runtime_state_is_not_persisted() {
        let mut entry = ConfigEntry::new("ccplayer", "CC Player")
            .with_data(HashMap::from([("name".to_string(), json!("CC Player"))]))
            .with_unique_id("ccplayer")
            .with_source(ConfigEntrySource::Mqtt);
        entry.state = ConfigEntryState::Loaded;
        entry.reason = Some("ok".into());

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("state").is_none());
        assert_eq!(json["source"], "mqtt");

        let back: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.state, ConfigEntryState::NotLoaded);
        assert_eq!(back.reason, None);
        assert_eq!(back.data_str("name"), Some("CC Player"));
        assert_eq!(back.unique_id.as_deref(), Some("ccplayer"));
    }

    #[test]
    fn test_minimal_stored_entry_gets_defaults() {
        let entry: ConfigEntry = serde_json::from_value(json!({
            "entry_id": "01H", "domain": "ccplayer", "title": "TV"
        }))
        .unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.source, ConfigEntrySource::User);
        assert!(entry.options.is_empty());
    }

    #[test]
    fn test_recoverable_states() {
        assert!(ConfigEntryState::Loaded.is_recoverable());
        assert!(ConfigEntryState::SetupError.is_recoverable());
        assert!(!ConfigEntryState::SetupInProgress.is_recoverable());
        assert!(!ConfigEntryState::FailedUnload.is_recoverable());
    }

    #[test]
    fn test_initial_steps() {
        assert_eq!(ConfigEntrySource::User.initial_step(), "user");
        assert_eq!(ConfigEntrySource::Mqtt.initial_step(), "mqtt");
    }
}
