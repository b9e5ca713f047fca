//! Reading values out of tracked entities

use ha_state_machine::StateMachine;
use serde_json::Value;
use tracing::warn;

/// Entity-side range of a volume entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRange {
    pub min: f64,
    pub max: f64,
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl VolumeRange {
    /// Entity value as a 0..1 level; 0 for a degenerate range.
    pub fn to_level(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            return 0.0;
        }
        (value - self.min) / span
    }

    /// 0..1 level as an entity value
    pub fn to_value(&self, level: f64) -> f64 {
        self.min + level * (self.max - self.min)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Read-only view over the state machine for one player
pub struct EntityReader<'a> {
    states: &'a StateMachine,
}

impl<'a> EntityReader<'a> {
    pub fn new(states: &'a StateMachine) -> Self {
        Self { states }
    }

    /// State string of `entity_id`; missing, `unknown`, `unavailable` and
    /// empty states all read as `None`.
    pub fn value(&self, entity_id: Option<&str>) -> Option<String> {
        let state = self.states.get(entity_id?)?;
        state.has_value().then_some(state.state)
    }

    pub fn numeric(&self, entity_id: Option<&str>) -> Option<f64> {
        let value = self.value(entity_id)?;
        match value.trim().parse::<f64>() {
            Ok(number) => Some(number),
            Err(_) => {
                warn!(entity_id = entity_id.unwrap_or_default(), %value, "state is not numeric");
                None
            }
        }
    }

    /// State parsed as a JSON array of strings, else as a comma-separated
    /// list with empty items dropped.
    pub fn list(&self, entity_id: Option<&str>) -> Option<Vec<String>> {
        self.value(entity_id).map(|value| parse_list(&value))
    }

    /// Attribute of `entity_id`, regardless of its state value
    pub fn attribute(&self, entity_id: Option<&str>, key: &str) -> Option<Value> {
        self.states
            .get(entity_id?)
            .and_then(|state| state.attributes.get(key).cloned())
    }

    /// Raw state string, including `unknown` and friends
    pub fn raw(&self, entity_id: Option<&str>) -> Option<String> {
        self.states.get(entity_id?).map(|state| state.state)
    }

    /// `min`/`max` attributes of the volume entity, defaulting to 0..1
    pub fn volume_range(&self, entity_id: Option<&str>) -> VolumeRange {
        let defaults = VolumeRange::default();
        let Some(state) = entity_id.and_then(|id| self.states.get(id)) else {
            return defaults;
        };
        VolumeRange {
            min: state.attribute::<f64>("min").unwrap_or(defaults.min),
            max: state.attribute::<f64>("max").unwrap_or(defaults.max),
        }
    }
}

pub fn parse_list(value: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(value) {
        return items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};
    use ha_event_bus::EventBus;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn machine() -> StateMachine {
        StateMachine::new(Arc::new(EventBus::new()))
    }

    fn set(states: &StateMachine, id: &str, value: &str, attributes: Value) {
        let attributes: HashMap<String, Value> = serde_json::from_value(attributes).unwrap();
        states.set(id.parse::<EntityId>().unwrap(), value, attributes, Context::new());
    }

    #[tokio::test]
    async fn test_value_treats_placeholders_as_missing() {
        let states = machine();
        set(&states, "sensor.title", "unknown", json!({}));
        set(&states, "sensor.artist", "", json!({}));
        set(&states, "sensor.album", "Blue", json!({}));
        let reader = EntityReader::new(&states);

        assert_eq!(reader.value(Some("sensor.title")), None);
        assert_eq!(reader.value(Some("sensor.artist")), None);
        assert_eq!(reader.value(Some("sensor.missing")), None);
        assert_eq!(reader.value(None), None);
        assert_eq!(reader.value(Some("sensor.album")).as_deref(), Some("Blue"));
        assert_eq!(reader.raw(Some("sensor.title")).as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn test_numeric() {
        let states = machine();
        set(&states, "sensor.position", "1500", json!({}));
        set(&states, "sensor.duration", "n/a", json!({}));
        let reader = EntityReader::new(&states);

        assert_eq!(reader.numeric(Some("sensor.position")), Some(1500.0));
        assert_eq!(reader.numeric(Some("sensor.duration")), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(r#"["HDMI 1", "TV"]"#), vec!["HDMI 1", "TV"]);
        assert_eq!(parse_list("HDMI 1, TV,, "), vec!["HDMI 1", "TV"]);
        assert_eq!(parse_list("[1, 2]"), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_volume_range() {
        let states = machine();
        set(&states, "number.volume", "50", json!({"min": 0, "max": 100}));
        let reader = EntityReader::new(&states);

        let range = reader.volume_range(Some("number.volume"));
        assert_eq!(range, VolumeRange { min: 0.0, max: 100.0 });
        assert_eq!(range.to_level(25.0), 0.25);
        assert_eq!(range.to_value(0.5), 50.0);
        assert_eq!(range.clamp(120.0), 100.0);

        assert_eq!(reader.volume_range(Some("number.missing")), VolumeRange::default());
        assert_eq!(VolumeRange { min: 3.0, max: 3.0 }.to_level(3.0), 0.0);
    }
}
