//! Running the action lists bound to player commands

use ha_core::Context;
use ha_script::{call_from_config, ServiceActionConfig};
use ha_service_registry::ServiceRegistry;
use ha_template::TemplateEngine;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Issue every action configured under `key` as a non-blocking service
/// call, rendering templates against `variables`.
///
/// Invalid elements and failing calls are logged and skipped. Returns the
/// number of actions issued.
pub async fn run_action_list(
    services: &ServiceRegistry,
    templates: &TemplateEngine,
    key: &str,
    actions: Option<&Value>,
    variables: &Value,
    context: &Context,
) -> usize {
    let items = match actions {
        None | Some(Value::Null) => {
            debug!(action = key, "no actions configured");
            return 0;
        }
        Some(Value::Array(items)) if items.is_empty() => {
            debug!(action = key, "no actions configured");
            return 0;
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(action = key, value = %other, "actions are not a list");
            return 0;
        }
    };

    let mut issued = 0;
    for item in items {
        if !item.is_object() {
            warn!(action = key, value = %item, "skipping action that is not a mapping");
            continue;
        }
        let config = match ServiceActionConfig::from_value(item.clone()) {
            Ok(config) => config,
            Err(err) => {
                error!(action = key, %err, value = %item, "invalid action");
                continue;
            }
        };
        match call_from_config(services, templates, &config, variables, false, context.child()).await {
            Ok(_) => {
                debug!(action = key, service = %config.action, "issued action");
                issued += 1;
            }
            Err(err) => error!(action = key, %err, value = %item, "action failed"),
        }
    }
    issued
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_event_bus::EventBus;
    use ha_state_machine::StateMachine;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup() -> (ServiceRegistry, TemplateEngine, mpsc::UnboundedReceiver<Value>) {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        let services = ServiceRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        services.register("number", "set_value", move |call| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(call.service_data);
                Ok(None)
            }
        });
        (services, TemplateEngine::new(states), rx)
    }

    #[tokio::test]
    async fn test_renders_variables_and_skips_invalid_items() {
        let (services, templates, mut rx) = setup();
        let actions = json!([
            "not a mapping",
            {"action": "number.set_value", "target": {"entity_id": "number.seek"},
             "data": {"value": "{{ seek_position }}"}, "metadata": {}},
            {"action": "missing.service"},
        ]);

        let issued = run_action_list(
            &services,
            &templates,
            "seek_action",
            Some(&actions),
            &json!({"seek_position": 42.5}),
            &Context::new(),
        )
        .await;
        assert_eq!(issued, 1);

        let data = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"entity_id": "number.seek", "value": 42.5}));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_list() {
        let (services, templates, _rx) = setup();
        let vars = json!({});
        let ctx = Context::new();
        assert_eq!(run_action_list(&services, &templates, "play_action", None, &vars, &ctx).await, 0);
        assert_eq!(
            run_action_list(&services, &templates, "play_action", Some(&json!([])), &vars, &ctx).await,
            0
        );
        assert_eq!(
            run_action_list(&services, &templates, "play_action", Some(&json!({"action": "x.y"})), &vars, &ctx)
                .await,
            0
        );
    }
}
