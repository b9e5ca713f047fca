//! Setup wizard: MQTT discovery, confirmation and linked-device selection

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{FlowContext, FlowError, FlowHandler, FlowOutcome, FlowResult, FormField};
use ha_registries::{DeviceEntry, EntityEntry, Registries};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::constants::*;

const FRAGMENT_PREFIX: &str = "ccast_player_ent_";

pub struct CcPlayerConfigFlow {
    registries: Arc<Registries>,
    prefix: String,
    unique_id: Option<String>,
}

impl CcPlayerConfigFlow {
    pub fn new(registries: Arc<Registries>) -> Self {
        Self {
            registries,
            prefix: DEFAULT_PREFIX.to_string(),
            unique_id: None,
        }
    }

    fn step_mqtt(&mut self, payload: Option<Value>, ctx: &FlowContext) -> FlowOutcome {
        if ctx.other_flows_in_progress > 0 || ctx.existing_entries > 0 {
            return Ok(FlowResult::abort("single_instance_allowed"));
        }
        self.unique_id = Some(DOMAIN.to_string());

        let discovery = match payload {
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(%err, "discovery payload is not JSON");
                    return Ok(FlowResult::abort("invalid_discovery_info"));
                }
            },
            Some(value) => value,
            None => Value::Null,
        };
        if let Some(id) = discovery.get("deviceUniqueID").and_then(Value::as_str) {
            info!(device = id, "discovered CC player");
            self.prefix = id.to_string();
        }
        self.step_confirm(None)
    }

    fn step_confirm(&mut self, user_input: Option<Value>) -> FlowOutcome {
        if user_input.is_some() && !self.prefix.is_empty() {
            if let Some(device) = self.registries.devices.find_by_identifier_value(&self.prefix) {
                debug!(device_id = %device.id, "discovered device is registered");
                let name = device.name.clone().unwrap_or_else(|| self.prefix.clone());
                return self.step_user(Some(json!({
                    CONF_NAME: name,
                    CONF_LINKED_DEVICE_ID: device.id,
                })));
            }
        }
        Ok(FlowResult::form("confirm", Vec::new()).with_placeholder("prefix", self.prefix.clone()))
    }

    fn step_user(&mut self, user_input: Option<Value>) -> FlowOutcome {
        let devices: Vec<Arc<DeviceEntry>> = self
            .registries
            .devices
            .devices()
            .into_iter()
            .filter(|d| d.has_identifiers())
            .collect();

        let Some(input) = user_input else {
            return Ok(user_form(&devices, HashMap::new()));
        };

        let selected = input.get(CONF_LINKED_DEVICE_ID).and_then(Value::as_str);
        let Some(device) = selected.and_then(|id| devices.iter().find(|d| d.id == id)) else {
            let errors = HashMap::from([(CONF_LINKED_DEVICE_ID.to_string(), "unknown_device".to_string())]);
            return Ok(user_form(&devices, errors));
        };
        let name = input
            .get(CONF_NAME)
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_NAME)
            .to_string();

        let entities = self.registries.entities.entities_for_device(&device.id);
        let device_name = device.name.clone().unwrap_or_else(|| device.id.clone());
        let fragment = device_fragment(&entities, &device_name);
        debug!(device_id = %device.id, %fragment, entities = entities.len(), "building defaults");

        let mut options = default_entities(&entities, &fragment);
        options.insert(CONF_ACTIONS.to_string(), default_actions(&fragment));

        let mut data = Map::new();
        data.insert(CONF_NAME.into(), json!(name));
        data.insert(CONF_LINKED_DEVICE_ID.into(), json!(device.id));
        data.insert(
            CONF_LINKED_DEVICE_IDENTIFIER.into(),
            device
                .identifiers
                .first()
                .map_or(Value::Null, |identifier| json!(identifier)),
        );

        Ok(FlowResult::create_entry(name, data).with_options(options))
    }
}

#[async_trait]
impl FlowHandler for CcPlayerConfigFlow {
    async fn step(&mut self, step_id: &str, user_input: Option<Value>, ctx: &FlowContext) -> FlowOutcome {
        match step_id {
            "mqtt" => self.step_mqtt(user_input, ctx),
            "confirm" => self.step_confirm(user_input),
            "user" => self.step_user(user_input),
            other => Err(FlowError::UnknownStep {
                handler: DOMAIN.to_string(),
                step: other.to_string(),
            }),
        }
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }
}

fn user_form(devices: &[Arc<DeviceEntry>], errors: HashMap<String, String>) -> FlowResult {
    let choices = devices
        .iter()
        .map(|d| (d.id.clone(), d.name.clone().unwrap_or_else(|| d.id.clone())))
        .collect();
    FlowResult::form(
        "user",
        vec![
            FormField::string(CONF_NAME).required().with_default(DEFAULT_NAME),
            FormField::select(CONF_LINKED_DEVICE_ID, choices).required(),
        ],
    )
    .with_errors(errors)
}

/// Common object-id prefix of a linked player's entities, such as
/// `ccast_player_ent_96950033`; falls back to the slugged device name.
pub fn device_fragment(entities: &[Arc<EntityEntry>], device_name: &str) -> String {
    entities
        .iter()
        .filter_map(|entity| {
            let object_id = entity.object_id();
            if !object_id.contains('_') {
                return None;
            }
            let fragment = object_id.split('_').take(4).collect::<Vec<_>>().join("_");
            fragment.starts_with(FRAGMENT_PREFIX).then_some(fragment)
        })
        .next()
        .unwrap_or_else(|| device_name.to_lowercase().replace(' ', "_"))
}

/// First entity of `domain` whose id ends with `suffix`
pub fn find_entity<'a>(entities: &'a [Arc<EntityEntry>], domain: &str, suffix: &str) -> Option<&'a str> {
    entities
        .iter()
        .find(|e| e.domain() == domain && e.entity_id.ends_with(suffix))
        .map(|e| e.entity_id.as_str())
}

fn default_entities(entities: &[Arc<EntityEntry>], fragment: &str) -> Map<String, Value> {
    let find = |domain: &str, suffix: &str| find_entity(entities, domain, &format!("{fragment}{suffix}"));
    let roles = [
        (CONF_PLAYER_STATE_ENTITY, find("sensor", "_playback_state")),
        (CONF_MEDIA_TITLE_ENTITY, find("sensor", "_media_title")),
        (CONF_MEDIA_IMAGE_ENTITY, find("image", "_media_thumbnail")),
        (CONF_MEDIA_POSITION_ENTITY, find("sensor", "_media_position")),
        (CONF_MEDIA_DURATION_ENTITY, find("sensor", "_media_duration")),
        (
            CONF_MUTE_ENTITY,
            find("switch", "_mute").or_else(|| find("switch", "_mute_control")),
        ),
        (CONF_VOLUME_ENTITY, find("number", "_volume")),
    ];
    roles
        .into_iter()
        .map(|(key, entity)| (key.to_string(), json!(entity.unwrap_or_default())))
        .collect()
}

fn default_actions(fragment: &str) -> Value {
    let action = |service: &str, entity_id: String, data: Value| {
        json!([{
            "action": service,
            "data": data,
            "metadata": {},
            "target": { "entity_id": entity_id },
        }])
    };
    json!({
        CONF_PLAY_ACTION: action("button.press", format!("button.{fragment}_play"), json!({})),
        CONF_PAUSE_ACTION: action("button.press", format!("button.{fragment}_pause"), json!({})),
        CONF_STOP_ACTION: action("button.press", format!("button.{fragment}_stop"), json!({})),
        CONF_SEEK_ACTION: action(
            "number.set_value",
            format!("number.{fragment}_media_seek"),
            json!({ "value": "{{seek_position}}" }),
        ),
        CONF_PLAY_MEDIA_ACTION: action(
            "text.set_value",
            format!("text.{fragment}_load_media_url"),
            json!({ "value": "{{media_id}}" }),
        ),
    })
}
