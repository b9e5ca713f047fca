//! Action configuration types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ScriptError;

/// Accept `"a"`, `"a, b"` or `["a", "b"]`.
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        OneOrMany::Many(v) => v,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_or_vec")]
    pub device_id: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_or_vec")]
    pub area_id: Vec<String>,
}

impl Target {
    pub fn is_empty(&self) -> bool {
        self.entity_id.is_empty() && self.device_id.is_empty() && self.area_id.is_empty()
    }

    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: vec![entity_id.into()],
            ..Default::default()
        }
    }
}

/// One service call action. `service` is accepted as the legacy name of
/// `action`, `data_template` as the legacy name of `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceActionConfig {
    #[serde(alias = "service")]
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    #[serde(default, alias = "data_template", skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,

    /// Editor metadata; carried along, never interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ServiceActionConfig {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            data: Map::new(),
            metadata: None,
            enabled: true,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn from_value(value: Value) -> Result<Self, ScriptError> {
        serde_json::from_value(value).map_err(|e| ScriptError::InvalidConfig(e.to_string()))
    }

    /// Split `action` into `(domain, service)`.
    pub fn service_parts(&self) -> Result<(&str, &str), ScriptError> {
        match self.action.split_once('.') {
            Some((domain, service)) if !domain.is_empty() && !service.is_empty() => {
                Ok((domain, service))
            }
            _ => Err(ScriptError::InvalidService(self.action.clone())),
        }
    }
}
