//! input_boolean

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::{Context, EntityId, ServiceCall, STATE_OFF, STATE_ON};
use ha_service_registry::{ServiceDescription, ServiceRegistry};
use ha_state_machine::StateMachine;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{base_attributes, target_entities};

const DOMAIN: &str = "input_boolean";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputBooleanConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// e.g. "mdi:bug"
    #[serde(default)]
    pub icon: Option<String>,
    /// Initial state (default off)
    #[serde(default)]
    pub initial: Option<bool>,
}

/// Create input_boolean entities from config. Returns how many were created.
pub fn load_input_booleans(
    config: &HashMap<String, Option<InputBooleanConfig>>,
    states: &StateMachine,
) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(DOMAIN, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid input_boolean id '{}': {}", id, e);
                continue;
            }
        };
        let config = config.clone().unwrap_or_default();
        let state = if config.initial.unwrap_or(false) {
            STATE_ON
        } else {
            STATE_OFF
        };

        let attributes = base_attributes(config.name.as_deref(), config.icon.as_deref());
        states.set(entity_id, state, attributes, Context::new());
        debug!("Loaded input_boolean.{} = {}", id, state);
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} input_boolean entities", count);
    }
    count
}

fn set_all(states: &StateMachine, call: &ServiceCall, next: impl Fn(&str) -> &'static str) {
    for entity_id in target_entities(call, DOMAIN) {
        if let Some(current) = states.get(&entity_id.to_string()) {
            let new_state = next(&current.state);
            states.set(entity_id, new_state, current.attributes, call.context.clone());
        }
    }
}

pub fn register_input_boolean_services(services: &ServiceRegistry, states: Arc<StateMachine>) {
    let services_and_transitions: [(&str, &str, fn(&str) -> &'static str); 3] = [
        ("turn_on", "Turn on", |_| STATE_ON),
        ("turn_off", "Turn off", |_| STATE_OFF),
        ("toggle", "Toggle", |current| {
            if current == STATE_ON {
                STATE_OFF
            } else {
                STATE_ON
            }
        }),
    ];

    for (service, name, next) in services_and_transitions {
        let states = states.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service)
                .with_name(name)
                .with_target(json!({"entity": {"domain": DOMAIN}})),
            move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    set_all(&states, &call, next);
                    Ok(None)
                }
            },
        );
    }

    info!("Input boolean services registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_event_bus::EventBus;

    fn setup() -> (Arc<StateMachine>, ServiceRegistry) {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let config: HashMap<String, Option<InputBooleanConfig>> = serde_yaml::from_str(
            r#"
            tv_power:
              name: TV Power
              initial: true
            tv_mute:
            "#,
        )
        .unwrap();
        assert_eq!(load_input_booleans(&config, &states), 2);
        let services = ServiceRegistry::new();
        register_input_boolean_services(&services, states.clone());
        (states, services)
    }

    #[tokio::test]
    async fn test_initial_states_and_toggle() {
        let (states, services) = setup();
        assert!(states.is_state("input_boolean.tv_power", "on"));
        assert!(states.is_state("input_boolean.tv_mute", "off"));
        assert_eq!(
            states.get("input_boolean.tv_power").unwrap().attributes["friendly_name"],
            "TV Power"
        );

        services
            .call(
                DOMAIN,
                "toggle",
                json!({"entity_id": ["input_boolean.tv_power", "input_boolean.tv_mute"]}),
                Context::new(),
                true,
                false,
            )
            .await
            .unwrap();
        assert!(states.is_state("input_boolean.tv_power", "off"));
        assert!(states.is_state("input_boolean.tv_mute", "on"));
    }

    #[tokio::test]
    async fn test_other_domains_ignored() {
        let (states, services) = setup();
        services
            .call(
                DOMAIN,
                "turn_on",
                json!({"entity_id": "switch.tv_mute, input_boolean.tv_mute"}),
                Context::new(),
                true,
                false,
            )
            .await
            .unwrap();
        assert!(states.is_state("input_boolean.tv_mute", "on"));
        assert!(states.get("switch.tv_mute").is_none());
    }
}
