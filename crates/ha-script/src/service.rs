//! Dispatching service actions

use ha_core::Context;
use ha_service_registry::{ServiceError, ServiceRegistry};
use ha_template::{TemplateEngine, TemplateError};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::action::ServiceActionConfig;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("invalid service name: {0:?}")]
    InvalidService(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Render `config` against `variables` and call its service.
///
/// Template strings in the service name, `data` and `target` are rendered
/// natively; the target fields are merged into the call data. Disabled
/// actions are skipped and return `Ok(None)`.
pub async fn call_from_config(
    services: &ServiceRegistry,
    templates: &TemplateEngine,
    config: &ServiceActionConfig,
    variables: &Value,
    blocking: bool,
    context: Context,
) -> Result<Option<Value>, ScriptError> {
    if !config.enabled {
        debug!(action = %config.action, "skipping disabled action");
        return Ok(None);
    }

    let rendered;
    let config = if TemplateEngine::is_template(&config.action) {
        let mut copy = config.clone();
        copy.action = templates
            .render_with_context(&config.action, variables)?
            .trim()
            .to_string();
        rendered = copy;
        &rendered
    } else {
        config
    };
    let (domain, service) = config.service_parts()?;

    let mut data = match templates.render_value(&Value::Object(config.data.clone()), variables)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    if let Some(target) = &config.target {
        for (key, ids) in [
            ("entity_id", &target.entity_id),
            ("device_id", &target.device_id),
            ("area_id", &target.area_id),
        ] {
            if ids.is_empty() {
                continue;
            }
            let rendered = ids
                .iter()
                .map(|id| templates.render_value(&Value::String(id.clone()), variables))
                .collect::<Result<Vec<_>, _>>()?;
            let value = match <[Value; 1]>::try_from(rendered) {
                Ok([single]) => single,
                Err(many) => Value::Array(many),
            };
            data.insert(key.to_string(), value);
        }
    }

    debug!(%domain, %service, blocking, "calling service from action");
    Ok(services
        .call(domain, service, Value::Object(data), context, blocking, false)
        .await?)
}
