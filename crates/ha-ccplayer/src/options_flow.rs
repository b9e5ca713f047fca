//! Multi-step editor for the role mapping and the action lists

use std::collections::HashMap;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, FlowContext, FlowError, FlowHandler, FlowOutcome, FlowResult, FormField};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::as_f64;
use crate::constants::*;

pub struct CcPlayerOptionsFlow {
    options: Map<String, Value>,
}

impl CcPlayerOptionsFlow {
    pub fn new(entry: &ConfigEntry) -> Self {
        let mut options: Map<String, Value> = entry
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !options.get(CONF_ACTIONS).is_some_and(Value::is_object) {
            options.insert(CONF_ACTIONS.to_string(), json!({}));
        }
        Self { options }
    }

    /// Options as edited so far
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    fn step_basic(&mut self, user_input: Option<Value>) -> FlowOutcome {
        let Some(input) = user_input else {
            return Ok(self.basic_form(HashMap::new()));
        };
        let volume_step = match input.get(CONF_VOLUME_STEP) {
            None => None,
            Some(value) => match as_f64(value) {
                Some(step) => Some(step),
                None => {
                    let errors = HashMap::from([(CONF_VOLUME_STEP.to_string(), "invalid_number".to_string())]);
                    return Ok(self.basic_form(errors));
                }
            },
        };
        self.apply_entities(&BASIC_ENTITY_KEYS, &input);
        if let Some(step) = volume_step {
            self.options.insert(CONF_VOLUME_STEP.to_string(), json!(step));
        }
        self.step_media_info(None)
    }

    fn step_media_info(&mut self, user_input: Option<Value>) -> FlowOutcome {
        match user_input {
            Some(input) => {
                self.apply_entities(&MEDIA_INFO_ENTITY_KEYS, &input);
                self.step_advanced_state(None)
            }
            None => Ok(self.entity_form("media_info", &MEDIA_INFO_ENTITY_KEYS)),
        }
    }

    fn step_advanced_state(&mut self, user_input: Option<Value>) -> FlowOutcome {
        match user_input {
            Some(input) => {
                self.apply_entities(&ADVANCED_STATE_ENTITY_KEYS, &input);
                self.step_playback_actions(None)
            }
            None => Ok(self.entity_form("advanced_state", &ADVANCED_STATE_ENTITY_KEYS)),
        }
    }

    fn step_playback_actions(&mut self, user_input: Option<Value>) -> FlowOutcome {
        match user_input {
            Some(input) => {
                self.apply_actions(&PLAYBACK_ACTION_KEYS, &input);
                self.step_other_actions(None)
            }
            None => Ok(self.action_form("playback_actions", &PLAYBACK_ACTION_KEYS)),
        }
    }

    fn step_other_actions(&mut self, user_input: Option<Value>) -> FlowOutcome {
        match user_input {
            Some(input) => {
                self.apply_actions(&OTHER_ACTION_KEYS, &input);
                debug!(actions = %self.options[CONF_ACTIONS], "options complete");
                Ok(FlowResult::create_entry("", self.options.clone()))
            }
            None => Ok(self
                .action_form("other_actions", &OTHER_ACTION_KEYS)
                .with_last_step(true)),
        }
    }

    /// Submitted keys only: a non-blank string is stored trimmed, anything
    /// else clears the role.
    fn apply_entities(&mut self, keys: &[&str], input: &Value) {
        for key in keys {
            let Some(value) = input.get(*key) else {
                continue;
            };
            match value.as_str().map(str::trim).filter(|v| !v.is_empty()) {
                Some(entity_id) => {
                    self.options.insert(key.to_string(), json!(entity_id));
                }
                None => {
                    self.options.remove(*key);
                }
            }
        }
    }

    fn apply_actions(&mut self, keys: &[&str], input: &Value) {
        let mut actions = match self.options.get(CONF_ACTIONS) {
            Some(Value::Object(actions)) => actions.clone(),
            other => {
                warn!(value = ?other, "stored actions are not a mapping, resetting");
                Map::new()
            }
        };
        for key in keys {
            let Some(value) = input.get(*key) else {
                continue;
            };
            if value.is_array() {
                actions.insert(key.to_string(), value.clone());
            } else {
                warn!(action = key, %value, "action data is not a list, clearing");
                actions.insert(key.to_string(), json!([]));
            }
        }
        self.options.insert(CONF_ACTIONS.to_string(), Value::Object(actions));
    }

    fn basic_form(&self, errors: HashMap<String, String>) -> FlowResult {
        let mut form = self.entity_form("basic", &BASIC_ENTITY_KEYS);
        let step = self
            .options
            .get(CONF_VOLUME_STEP)
            .and_then(as_f64)
            .unwrap_or(DEFAULT_VOLUME_STEP);
        form.data_schema
            .push(FormField::number(CONF_VOLUME_STEP, 0.01, 1.0, 0.01).with_default(step));
        form.with_errors(errors)
    }

    fn entity_form(&self, step_id: &str, keys: &[&str]) -> FlowResult {
        let schema = keys
            .iter()
            .map(|key| {
                let field = FormField::entity(key, entity_domains(key));
                match self.options.get(*key).and_then(Value::as_str) {
                    Some(current) if !current.is_empty() => field.with_default(current),
                    _ => field,
                }
            })
            .collect();
        FlowResult::form(step_id, schema).with_last_step(false)
    }

    fn action_form(&self, step_id: &str, keys: &[&str]) -> FlowResult {
        let stored = self.options.get(CONF_ACTIONS).and_then(Value::as_object);
        let schema = keys
            .iter()
            .map(|key| {
                let field = FormField::action(key);
                match stored.and_then(|actions| actions.get(*key)) {
                    Some(list @ Value::Array(_)) => field.with_default(list.clone()),
                    Some(Value::Null) | None => field,
                    Some(other) => {
                        warn!(action = key, value = %other, "stored action is not a list, showing as unset");
                        field
                    }
                }
            })
            .collect();
        FlowResult::form(step_id, schema).with_last_step(false)
    }
}

#[async_trait]
impl FlowHandler for CcPlayerOptionsFlow {
    async fn step(&mut self, step_id: &str, user_input: Option<Value>, _ctx: &FlowContext) -> FlowOutcome {
        match step_id {
            "init" => self.step_basic(None),
            "basic" => self.step_basic(user_input),
            "media_info" => self.step_media_info(user_input),
            "advanced_state" => self.step_advanced_state(user_input),
            "actions" => {
                warn!("the actions step is deprecated, continuing with playback_actions");
                self.step_playback_actions(user_input)
            }
            "playback_actions" => self.step_playback_actions(user_input),
            "other_actions" => self.step_other_actions(user_input),
            other => Err(FlowError::UnknownStep {
                handler: DOMAIN.to_string(),
                step: other.to_string(),
            }),
        }
    }
}
