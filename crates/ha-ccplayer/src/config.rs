//! Player settings derived from a config entry

use ha_config_entries::ConfigEntry;
use ha_registries::DeviceIdentifier;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::*;
use crate::state::MediaPlayerFeature;

/// Everything the player reads from its config entry
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub name: String,
    /// Role key to entity id; roles without an entity are absent
    pub entities: IndexMap<&'static str, String>,
    pub actions: IndexMap<&'static str, Value>,
    pub volume_step: f64,
    /// Base of the `yan/{base}/...` MQTT topics
    pub mqtt_base: String,
    pub device_identifier: DeviceIdentifier,
}

impl PlayerConfig {
    pub fn from_entry(entry: &ConfigEntry) -> Self {
        let name = entry
            .data_str(CONF_NAME)
            .filter(|n| !n.is_empty())
            .unwrap_or(if entry.title.is_empty() { DEFAULT_NAME } else { entry.title.as_str() })
            .to_string();

        let entities = entity_keys()
            .filter_map(|key| {
                let id = entry.options.get(key)?.as_str()?.trim();
                (!id.is_empty()).then(|| (key, id.to_string()))
            })
            .collect();

        let nested = entry.options.get(CONF_ACTIONS).and_then(Value::as_object);
        let actions: IndexMap<_, _> = action_keys()
            .filter_map(|key| {
                nested
                    .and_then(|actions| actions.get(key))
                    .or_else(|| entry.options.get(key))
                    .map(|value| (key, value.clone()))
            })
            .collect();
        debug!(entry_id = %entry.entry_id, actions = ?actions.keys().collect::<Vec<_>>(), "loaded actions");

        let volume_step = entry
            .options
            .get(CONF_VOLUME_STEP)
            .and_then(as_f64)
            .unwrap_or(DEFAULT_VOLUME_STEP);

        let mqtt_base = entry
            .data_str(CONF_DEVICE_ID)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_PREFIX)
            .to_string();

        let device_identifier = entry
            .data
            .get(CONF_LINKED_DEVICE_IDENTIFIER)
            .and_then(|v| serde_json::from_value::<DeviceIdentifier>(v.clone()).ok())
            .unwrap_or_else(|| DeviceIdentifier::new(DOMAIN, &entry.entry_id));

        Self {
            name,
            entities,
            actions,
            volume_step,
            mqtt_base,
            device_identifier,
        }
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }

    pub fn action(&self, key: &str) -> Option<&Value> {
        self.actions.get(key)
    }

    /// A configured action that is not null, empty or false
    pub fn has_action(&self, key: &str) -> bool {
        self.action(key).is_some_and(is_truthy)
    }

    /// Entity ids whose changes trigger a refresh
    pub fn tracked_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.entities.values() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    pub fn supported_features(&self) -> MediaPlayerFeature {
        let mut features = MediaPlayerFeature::empty();
        if self.entity(CONF_POWER_ENTITY).is_some() {
            features |= MediaPlayerFeature::TURN_ON | MediaPlayerFeature::TURN_OFF;
        }
        if self.entity(CONF_VOLUME_ENTITY).is_some() {
            features |= MediaPlayerFeature::VOLUME_SET | MediaPlayerFeature::VOLUME_STEP;
        }
        if self.entity(CONF_MUTE_ENTITY).is_some() {
            features |= MediaPlayerFeature::VOLUME_MUTE;
        }
        if self.entity(CONF_SOURCE_ENTITY).is_some() {
            features |= MediaPlayerFeature::SELECT_SOURCE;
        }

        for (key, feature) in [
            (CONF_PLAY_ACTION, MediaPlayerFeature::PLAY),
            (CONF_PAUSE_ACTION, MediaPlayerFeature::PAUSE),
            (CONF_STOP_ACTION, MediaPlayerFeature::STOP),
            (CONF_NEXT_ACTION, MediaPlayerFeature::NEXT_TRACK),
            (CONF_PREVIOUS_ACTION, MediaPlayerFeature::PREVIOUS_TRACK),
            (
                CONF_PLAY_PAUSE_ACTION,
                MediaPlayerFeature::PLAY | MediaPlayerFeature::PAUSE,
            ),
            (CONF_SEEK_ACTION, MediaPlayerFeature::SEEK),
            (CONF_CLEAR_PLAYLIST_ACTION, MediaPlayerFeature::CLEAR_PLAYLIST),
            (CONF_SHUFFLE_SET_ACTION, MediaPlayerFeature::SHUFFLE_SET),
            (CONF_REPEAT_SET_ACTION, MediaPlayerFeature::REPEAT_SET),
            (CONF_SELECT_SOUND_MODE_ACTION, MediaPlayerFeature::SELECT_SOUND_MODE),
        ] {
            if self.has_action(key) {
                features |= feature;
            }
        }

        features | MediaPlayerFeature::PLAY_MEDIA | MediaPlayerFeature::BROWSE_MEDIA
    }

    /// `configured_entities` attribute
    pub fn entities_attribute(&self) -> Value {
        Value::Object(
            self.entities
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// `configured_actions` attribute
    pub fn actions_attribute(&self) -> Value {
        Value::Object(
            self.actions
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Map<_, _>>(),
        )
    }
}

/// A number, or a string holding one
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
    }
}
