//! input_number

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::{Context, EntityId, ServiceCall, State};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use ha_state_machine::StateMachine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{base_attributes, target_entities};

const DOMAIN: &str = "input_number";

#[derive(Debug, Clone, Deserialize)]
pub struct InputNumberConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default)]
    pub initial: Option<f64>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
    /// slider or box
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_step() -> f64 {
    1.0
}

fn default_mode() -> String {
    "slider".to_string()
}

/// Create input_number entities from config. Returns how many were created.
pub fn load_input_numbers(config: &HashMap<String, InputNumberConfig>, states: &StateMachine) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(DOMAIN, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid input_number id '{}': {}", id, e);
                continue;
            }
        };

        if config.min >= config.max {
            warn!(
                "input_number.{}: min ({}) must be less than max ({})",
                id, config.min, config.max
            );
            continue;
        }

        let value = config.initial.unwrap_or(config.min).clamp(config.min, config.max);

        let mut attributes = base_attributes(config.name.as_deref(), config.icon.as_deref());
        if let Some(unit) = &config.unit_of_measurement {
            attributes.insert("unit_of_measurement".to_string(), json!(unit));
        }
        attributes.insert("min".to_string(), json!(config.min));
        attributes.insert("max".to_string(), json!(config.max));
        attributes.insert("step".to_string(), json!(config.step));
        attributes.insert("mode".to_string(), json!(config.mode));
        if let Some(initial) = config.initial {
            attributes.insert("initial".to_string(), json!(initial));
        }

        let state = format_number(value);
        debug!("Loaded input_number.{} = {}", id, state);
        states.set(entity_id, state, attributes, Context::new());
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} input_number entities", count);
    }
    count
}

/// State string of a number: integers without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn attr_f64(state: &State, key: &str, default: f64) -> f64 {
    state.attribute::<f64>(key).unwrap_or(default)
}

/// Numbers arrive as JSON numbers or, from templates, as numeric strings.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn apply(states: &StateMachine, call: &ServiceCall, next: impl Fn(&State) -> f64) {
    for entity_id in target_entities(call, DOMAIN) {
        if let Some(current) = states.get(&entity_id.to_string()) {
            let min = attr_f64(&current, "min", 0.0);
            let max = attr_f64(&current, "max", 100.0);
            let value = next(&current).clamp(min, max);
            states.set(entity_id, format_number(value), current.attributes, call.context.clone());
        }
    }
}

pub fn register_input_number_services(services: &ServiceRegistry, states: Arc<StateMachine>) {
    let target = json!({"entity": {"domain": DOMAIN}});

    let set_states = states.clone();
    services.register_with_description(
        ServiceDescription::new(DOMAIN, "set_value")
            .with_name("Set value")
            .with_schema(json!({
                "type": "object",
                "required": ["value"],
                "properties": {"value": {"type": ["number", "string"]}}
            }))
            .with_target(target.clone()),
        move |call: ServiceCall| {
            let states = set_states.clone();
            async move {
                let value = call
                    .service_data
                    .get("value")
                    .and_then(value_as_f64)
                    .ok_or_else(|| ServiceError::InvalidData("value must be a number".into()))?;
                apply(&states, &call, |_| value);
                Ok(None)
            }
        },
    );

    for (service, name, direction) in [("increment", "Increment", 1.0), ("decrement", "Decrement", -1.0)] {
        let states = states.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service)
                .with_name(name)
                .with_target(target.clone()),
            move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    apply(&states, &call, |current| {
                        let value: f64 = current.state.parse().unwrap_or(0.0);
                        value + direction * attr_f64(current, "step", 1.0)
                    });
                    Ok(None)
                }
            },
        );
    }

    info!("Input number services registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_event_bus::EventBus;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(120.0), "120");
        assert_eq!(format_number(-5.0), "-5");
        assert_eq!(format_number(0.35), "0.35");
    }

    #[test]
    fn test_config_deserialize() {
        let config: InputNumberConfig = serde_yaml::from_str(
            r#"
            name: TV Volume
            min: 0
            max: 100
            initial: 20
            "#,
        )
        .unwrap();
        assert_eq!(config.step, 1.0);
        assert_eq!(config.mode, "slider");
        assert_eq!(config.initial, Some(20.0));
    }

    async fn setup() -> (Arc<StateMachine>, ServiceRegistry) {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let config: HashMap<String, InputNumberConfig> = serde_yaml::from_str(
            r#"
            tv_volume: {min: 0, max: 100, step: 5, initial: 20}
            broken: {min: 10, max: 10}
            "#,
        )
        .unwrap();
        assert_eq!(load_input_numbers(&config, &states), 1);
        let services = ServiceRegistry::new();
        register_input_number_services(&services, states.clone());
        (states, services)
    }

    #[tokio::test]
    async fn test_set_value_clamps() {
        let (states, services) = setup().await;
        let call = |value: Value| {
            services.call(
                DOMAIN,
                "set_value",
                json!({"entity_id": "input_number.tv_volume", "value": value}),
                Context::new(),
                true,
                false,
            )
        };

        call(json!(42.5)).await.unwrap();
        assert!(states.is_state("input_number.tv_volume", "42.5"));
        call(json!("250")).await.unwrap();
        assert!(states.is_state("input_number.tv_volume", "100"));
        call(json!(-3)).await.unwrap();
        assert!(states.is_state("input_number.tv_volume", "0"));
        assert!(call(json!("loud")).await.is_err());
    }

    #[tokio::test]
    async fn test_increment_uses_step() {
        let (states, services) = setup().await;
        services
            .call(
                DOMAIN,
                "increment",
                json!({"entity_id": "input_number.tv_volume"}),
                Context::new(),
                true,
                false,
            )
            .await
            .unwrap();
        assert!(states.is_state("input_number.tv_volume", "25"));
    }
}
