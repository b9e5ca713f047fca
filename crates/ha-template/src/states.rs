//! The `states` object and state helper functions

use std::sync::Arc;

use ha_core::State;
use ha_state_machine::StateMachine;
use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};

/// `states` as seen from a template: callable as `states('domain.id')`
/// (the state string, or `unknown`) and indexable as
/// `states.domain.object_id` (a state object).
#[derive(Clone)]
pub struct StatesObject {
    machine: Arc<StateMachine>,
}

impl std::fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatesObject").finish_non_exhaustive()
    }
}

impl StatesObject {
    pub fn new(machine: Arc<StateMachine>) -> Self {
        Self { machine }
    }

    pub fn state(&self, entity_id: &str) -> String {
        self.machine
            .get_state(entity_id)
            .unwrap_or_else(|| ha_core::STATE_UNKNOWN.to_string())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.machine.is_state(entity_id, state)
    }

    pub fn state_attr(&self, entity_id: &str, attribute: &str) -> Value {
        self.machine
            .get(entity_id)
            .and_then(|s| s.attributes.get(attribute).map(Value::from_serialize))
            .unwrap_or_else(|| Value::from(()))
    }

    pub fn has_value(&self, entity_id: &str) -> bool {
        self.machine.get(entity_id).is_some_and(|s| s.has_value())
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        if key.contains('.') {
            return self.machine.get(key).map(state_value);
        }
        Some(Value::from_object(DomainStates {
            domain: key.to_string(),
            machine: self.machine.clone(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, args: &[Value]) -> Result<Value, Error> {
        let entity_id = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::new(ErrorKind::MissingArgument, "states() needs an entity_id"))?;
        Ok(Value::from(self.state(entity_id)))
    }
}

/// `states.<domain>`
#[derive(Clone)]
struct DomainStates {
    domain: String,
    machine: Arc<StateMachine>,
}

impl std::fmt::Debug for DomainStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainStates")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Object for DomainStates {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let entity_id = format!("{}.{}", self.domain, key.as_str()?);
        self.machine.get(&entity_id).map(state_value)
    }
}

fn state_value(state: State) -> Value {
    Value::from_object(TemplateState(state))
}

#[derive(Debug, Clone)]
struct TemplateState(State);

impl Object for TemplateState {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let state = &self.0;
        match key.as_str()? {
            "state" => Some(Value::from(state.state.as_str())),
            "entity_id" => Some(Value::from(state.entity_id.to_string())),
            "domain" => Some(Value::from(state.entity_id.domain())),
            "object_id" => Some(Value::from(state.entity_id.object_id())),
            "name" => Some(
                state
                    .attributes
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from(state.entity_id.object_id())),
            ),
            "attributes" => Some(Value::from_serialize(&state.attributes)),
            "last_changed" => Some(Value::from(state.last_changed.to_rfc3339())),
            "last_updated" => Some(Value::from(state.last_updated.to_rfc3339())),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.state)
    }
}
