//! Entity state snapshots

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of one entity at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    /// Moves only when `state` itself changes
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor of `self`; `last_changed` is carried over when the state
    /// string is unchanged.
    pub fn with_update(
        &self,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> Self {
        let state = state.into();
        let now = Utc::now();
        Self {
            entity_id: self.entity_id.clone(),
            last_changed: if state == self.state {
                self.last_changed
            } else {
                now
            },
            state,
            attributes,
            last_updated: now,
            context,
        }
    }

    /// False for `unknown`, `unavailable` and the empty string.
    pub fn has_value(&self) -> bool {
        !(self.state.is_empty() || self.state == STATE_UNKNOWN || self.state == STATE_UNAVAILABLE)
    }

    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }
}

impl PartialEq for State {
    /// Timestamps and context do not take part in equality.
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor(value: &str) -> State {
        State::new(
            "sensor.title".parse().unwrap(),
            value,
            HashMap::new(),
            Context::new(),
        )
    }

    #[test]
    fn test_has_value() {
        assert!(sensor("Movie").has_value());
        assert!(sensor("0").has_value());
        assert!(!sensor("").has_value());
        assert!(!sensor("unknown").has_value());
        assert!(!sensor("unavailable").has_value());
    }

    #[test]
    fn test_with_update_keeps_last_changed_for_same_value() {
        let first = sensor("Movie");
        let same = first.with_update("Movie", HashMap::new(), Context::new());
        assert_eq!(same.last_changed, first.last_changed);
        assert!(same.last_updated >= first.last_updated);

        let other = first.with_update("Show", HashMap::new(), Context::new());
        assert!(other.last_changed >= first.last_changed);
        assert_eq!(other.state, "Show");
    }

    #[test]
    fn test_typed_attribute() {
        let mut attrs = HashMap::new();
        attrs.insert("min".to_string(), json!(0));
        attrs.insert("max".to_string(), json!(100.0));
        attrs.insert("options".to_string(), json!(["HDMI 1", "HDMI 2"]));
        let state = State::new("number.volume".parse().unwrap(), "30", attrs, Context::new());

        assert_eq!(state.attribute::<f64>("min"), Some(0.0));
        assert_eq!(state.attribute::<f64>("max"), Some(100.0));
        assert_eq!(
            state.attribute::<Vec<String>>("options").unwrap(),
            vec!["HDMI 1", "HDMI 2"]
        );
        assert_eq!(state.attribute::<f64>("options"), None);
    }
}
