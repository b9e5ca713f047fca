//! input_select

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::{Context, EntityId, ServiceCall};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use ha_state_machine::StateMachine;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{base_attributes, target_entities};

const DOMAIN: &str = "input_select";

#[derive(Debug, Clone, Deserialize)]
pub struct InputSelectConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub options: Vec<String>,
    /// Defaults to the first option
    #[serde(default)]
    pub initial: Option<String>,
}

/// Create input_select entities from config. Returns how many were created.
pub fn load_input_selects(config: &HashMap<String, InputSelectConfig>, states: &StateMachine) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(DOMAIN, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid input_select id '{}': {}", id, e);
                continue;
            }
        };
        let Some(first) = config.options.first() else {
            warn!("input_select.{}: at least one option is required", id);
            continue;
        };
        let state = match &config.initial {
            Some(initial) if config.options.contains(initial) => initial.clone(),
            _ => first.clone(),
        };

        let mut attributes = base_attributes(config.name.as_deref(), config.icon.as_deref());
        attributes.insert("options".to_string(), json!(config.options));

        debug!("Loaded input_select.{} = {}", id, state);
        states.set(entity_id, state, attributes, Context::new());
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} input_select entities", count);
    }
    count
}

pub fn register_input_select_services(services: &ServiceRegistry, states: Arc<StateMachine>) {
    services.register_with_description(
        ServiceDescription::new(DOMAIN, "select_option")
            .with_name("Select option")
            .with_schema(json!({
                "type": "object",
                "required": ["option"],
                "properties": {"option": {"type": "string"}}
            }))
            .with_target(json!({"entity": {"domain": DOMAIN}})),
        move |call: ServiceCall| {
            let states = states.clone();
            async move {
                let option: String = call
                    .get("option")
                    .ok_or_else(|| ServiceError::InvalidData("option is required".into()))?;
                for entity_id in target_entities(&call, DOMAIN) {
                    let Some(current) = states.get(&entity_id.to_string()) else {
                        continue;
                    };
                    let options: Vec<String> = current.attribute("options").unwrap_or_default();
                    if !options.contains(&option) {
                        return Err(ServiceError::InvalidData(format!(
                            "invalid option {option} for {entity_id}"
                        )));
                    }
                    states.set(entity_id, option.clone(), current.attributes, call.context.clone());
                }
                Ok(None)
            }
        },
    );

    info!("Input select services registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_event_bus::EventBus;

    #[tokio::test]
    async fn test_select_option() {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let config: HashMap<String, InputSelectConfig> = serde_yaml::from_str(
            r#"
            tv_source:
              options: [HDMI 1, HDMI 2, Cast]
              initial: Cast
            empty:
              options: []
            "#,
        )
        .unwrap();
        assert_eq!(load_input_selects(&config, &states), 1);
        assert!(states.is_state("input_select.tv_source", "Cast"));

        let services = ServiceRegistry::new();
        register_input_select_services(&services, states.clone());
        let select = |option: &str| {
            services.call(
                DOMAIN,
                "select_option",
                json!({"entity_id": "input_select.tv_source", "option": option}),
                Context::new(),
                true,
                false,
            )
        };

        select("HDMI 2").await.unwrap();
        assert!(states.is_state("input_select.tv_source", "HDMI 2"));
        assert!(select("VGA").await.is_err());
        assert!(states.is_state("input_select.tv_source", "HDMI 2"));
    }
}
