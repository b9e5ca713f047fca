//! Built-in Components
//!
//! Helper entities that other integrations can be wired to, and the
//! domain-agnostic `homeassistant.*` services.

mod homeassistant;
mod input_boolean;
mod input_number;
mod input_select;

pub use homeassistant::register_homeassistant_services;
pub use input_boolean::{load_input_booleans, register_input_boolean_services, InputBooleanConfig};
pub use input_number::{
    format_number, load_input_numbers, register_input_number_services, InputNumberConfig,
};
pub use input_select::{load_input_selects, register_input_select_services, InputSelectConfig};

use std::collections::HashMap;

use ha_core::{EntityId, ServiceCall};
use serde_json::{json, Value};

/// Targeted entities of `call` that belong to `domain`
fn target_entities(call: &ServiceCall, domain: &str) -> Vec<EntityId> {
    call.entity_ids()
        .into_iter()
        .filter_map(|id| id.parse::<EntityId>().ok())
        .filter(|e| e.domain() == domain)
        .collect()
}

fn base_attributes(name: Option<&str>, icon: Option<&str>) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    if let Some(name) = name {
        attributes.insert("friendly_name".to_string(), json!(name));
    }
    if let Some(icon) = icon {
        attributes.insert("icon".to_string(), json!(icon));
    }
    attributes.insert("editable".to_string(), json!(false));
    attributes
}
