//! `homeassistant.turn_on|turn_off|toggle`
//!
//! Domain-agnostic services: targeted entities are grouped by domain and
//! the same service is called on each domain.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use ha_core::ServiceCall;
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde_json::{json, Value};
use tracing::{info, warn};

const DOMAIN: &str = "homeassistant";

async fn forward(services: Weak<ServiceRegistry>, call: ServiceCall) -> Result<Option<Value>, ServiceError> {
    let Some(services) = services.upgrade() else {
        return Ok(None);
    };

    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entity_id in call.entity_ids() {
        match entity_id.split_once('.') {
            Some((domain, _)) if domain != DOMAIN => {
                by_domain.entry(domain.to_string()).or_default().push(entity_id)
            }
            _ => warn!(%entity_id, "cannot forward {} to entity", call.service_id()),
        }
    }

    for (domain, entity_ids) in by_domain {
        if !services.has_service(&domain, &call.service) {
            warn!("{}.{} is not supported", domain, call.service);
            continue;
        }
        let mut data = match &call.service_data {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };
        data.insert("entity_id".to_string(), json!(entity_ids));
        services
            .call(
                &domain,
                &call.service,
                Value::Object(data),
                call.context.clone(),
                true,
                false,
            )
            .await?;
    }
    Ok(None)
}

pub fn register_homeassistant_services(services: &Arc<ServiceRegistry>) {
    for (service, name) in [("turn_on", "Turn on"), ("turn_off", "Turn off"), ("toggle", "Toggle")] {
        let registry = Arc::downgrade(services);
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service)
                .with_name(name)
                .with_target(json!({"entity": {}})),
            move |call: ServiceCall| forward(registry.clone(), call),
        );
    }
    info!("homeassistant services registered");
}
