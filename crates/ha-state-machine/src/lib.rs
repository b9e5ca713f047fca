//! Entity state machine
//!
//! Holds the current [`State`] of every entity and fires `state_changed` on
//! the bus for each write and removal. [`track_state_change_event`] lets a
//! component react to changes of a fixed set of entities.

mod track;

pub use track::track_state_change_event;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use serde_json::Value;
use tracing::{debug, instrument};

pub struct StateMachine {
    states: DashMap<String, State>,
    bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Write the state of `entity_id` and fire `state_changed`.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.get(&key);
        let new_state = match &old_state {
            Some(previous) => previous.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };
        debug!(state = %new_state.state, "state written");

        self.states.insert(key, new_state.clone());
        self.bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );
        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.value().clone())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.states
            .get(entity_id)
            .is_some_and(|s| s.state == state)
    }

    /// Entity ids of one domain, sorted
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|s| s.entity_id.domain() == domain)
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|s| s.value().clone()).collect()
    }

    /// Remove an entity; fires `state_changed` with `new_state: None` if it existed.
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let (_, old) = self.states.remove(&entity_id.to_string())?;
        debug!("state removed");
        self.bus.fire_typed(
            StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(old.clone()),
                new_state: None,
            },
            context,
        );
        Some(old)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

pub type SharedStateMachine = Arc<StateMachine>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (Arc<EventBus>, StateMachine) {
        let bus = Arc::new(EventBus::new());
        (bus.clone(), StateMachine::new(bus))
    }

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_set_fires_state_changed_with_old_state() {
        let (bus, sm) = setup();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        sm.set(id("sensor.title"), "Intro", HashMap::new(), Context::new());
        sm.set(id("sensor.title"), "Main", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.data.old_state.is_none());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.old_state.unwrap().state, "Intro");
        assert_eq!(second.data.new_state.unwrap().state, "Main");
    }

    #[test]
    fn test_queries() {
        let (_, sm) = setup();
        let attrs = HashMap::from([("max".to_string(), json!(100))]);
        sm.set(id("number.volume"), "30", attrs, Context::new());
        sm.set(id("number.seek"), "0", HashMap::new(), Context::new());
        sm.set(id("switch.mute"), "off", HashMap::new(), Context::new());

        assert_eq!(sm.get_state("number.volume").as_deref(), Some("30"));
        assert_eq!(sm.get("number.volume").unwrap().attribute::<i64>("max"), Some(100));
        assert!(sm.is_state("switch.mute", "off"));
        assert!(!sm.is_state("switch.missing", "off"));
        assert_eq!(sm.entity_ids("number"), vec!["number.seek", "number.volume"]);
        assert_eq!(sm.len(), 3);
    }

    #[tokio::test]
    async fn test_remove_fires_event_once() {
        let (bus, sm) = setup();
        sm.set(id("switch.mute"), "on", HashMap::new(), Context::new());
        let mut rx = bus.subscribe("state_changed");

        assert!(sm.remove(&id("switch.mute"), Context::new()).is_some());
        assert!(sm.remove(&id("switch.mute"), Context::new()).is_none());

        let event = rx.recv().await.unwrap();
        assert!(event.data["new_state"].is_null());
        assert!(rx.try_recv().is_err());
    }
}
