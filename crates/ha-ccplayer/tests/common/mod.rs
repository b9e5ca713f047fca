//! Test runtime: a hass on a temp dir with a loopback broker, the helper
//! components and stand-ins for the device services players call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ha_ccplayer::{async_setup, CcPlayer, CcPlayerIntegration, Hass, HassUrls};
use ha_components::{
    load_input_numbers, load_input_selects, register_homeassistant_services,
    register_input_boolean_services, register_input_number_services,
    register_input_select_services, InputNumberConfig, InputSelectConfig,
};
use ha_config_entries::ConfigEntry;
use ha_core::{Context, EntityId, ServiceCall, State};
use ha_mqtt::{LoopbackMqtt, SharedMqtt};
use serde_json::{json, Value};
use tempfile::TempDir;

pub struct TestHass {
    pub hass: Arc<Hass>,
    pub mqtt: Arc<LoopbackMqtt>,
    pub integration: Arc<CcPlayerIntegration>,
    calls: Arc<Mutex<Vec<ServiceCall>>>,
    _dir: TempDir,
}

/// Services standing in for a real device's buttons, numbers and switches
const RECORDED: &[(&str, &str)] = &[
    ("button", "press"),
    ("number", "set_value"),
    ("text", "set_value"),
    ("select", "select_option"),
    ("switch", "turn_on"),
    ("switch", "turn_off"),
    ("switch", "toggle"),
];

impl TestHass {
    pub async fn new() -> Self {
        Self::with_urls(HassUrls::default()).await
    }

    pub async fn with_urls(urls: HassUrls) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mqtt = Arc::new(LoopbackMqtt::recording());
        let shared: SharedMqtt = mqtt.clone();
        let hass = Arc::new(Hass::new(dir.path(), shared, urls));

        register_homeassistant_services(&hass.services);
        register_input_boolean_services(&hass.services, hass.states.clone());
        register_input_number_services(&hass.services, hass.states.clone());
        register_input_select_services(&hass.services, hass.states.clone());

        let calls = Arc::new(Mutex::new(Vec::new()));
        for (domain, service) in RECORDED {
            let sink = calls.clone();
            let states = hass.states.clone();
            hass.services.register(*domain, *service, move |call: ServiceCall| {
                let sink = sink.clone();
                let states = states.clone();
                async move {
                    if call.domain == "switch" {
                        for id in call.entity_ids() {
                            let on = match call.service.as_str() {
                                "turn_on" => true,
                                "turn_off" => false,
                                _ => states.get(&id).map_or(true, |s| s.state != "on"),
                            };
                            let id: EntityId = id.parse().unwrap();
                            states.set(id, if on { "on" } else { "off" }, HashMap::new(), Context::new());
                        }
                    }
                    sink.lock().unwrap().push(call);
                    Ok(None)
                }
            });
        }

        let integration = async_setup(&hass);
        Self {
            hass,
            mqtt,
            integration,
            calls,
            _dir: dir,
        }
    }

    pub fn set_state(&self, entity_id: &str, state: &str, attributes: Value) {
        let attributes: HashMap<String, Value> = serde_json::from_value(attributes).unwrap();
        self.hass
            .states
            .set(entity_id.parse().unwrap(), state, attributes, Context::new());
    }

    pub fn state(&self, entity_id: &str) -> Option<State> {
        self.hass.states.get(entity_id)
    }

    pub fn add_input_number(&self, id: &str, min: f64, max: f64, initial: f64) {
        let config: InputNumberConfig =
            serde_json::from_value(json!({"min": min, "max": max, "step": 0.01, "initial": initial})).unwrap();
        load_input_numbers(&HashMap::from([(id.to_string(), config)]), &self.hass.states);
    }

    pub fn add_input_select(&self, id: &str, options: &[&str]) {
        let config: InputSelectConfig = serde_json::from_value(json!({"options": options})).unwrap();
        load_input_selects(&HashMap::from([(id.to_string(), config)]), &self.hass.states);
    }

    /// Add and set up an entry with the given options; returns its player
    pub async fn add_player(&self, name: &str, options: Value) -> Arc<CcPlayer> {
        self.add_player_with_data(json!({"name": name}), options).await
    }

    pub async fn add_player_with_data(&self, data: Value, options: Value) -> Arc<CcPlayer> {
        let title = data["name"].as_str().unwrap_or("CC Player").to_string();
        let entry = ConfigEntry::new("ccplayer", title)
            .with_data(serde_json::from_value(data).unwrap())
            .with_options(serde_json::from_value(options).unwrap());
        let entry = self.hass.entries.add(entry).await.unwrap();
        self.hass.entries.setup(&entry.entry_id).await.unwrap();
        self.integration.player_for_entry(&entry.entry_id).unwrap()
    }

    /// Recorded calls to `domain.service`
    pub fn calls(&self, domain: &str, service: &str) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain == domain && c.service == service)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub async fn call(&self, service: &str, data: Value) -> Option<Value> {
        self.hass
            .services
            .call("media_player", service, data, Context::new(), true, false)
            .await
            .unwrap()
    }

    pub async fn browse(&self, data: Value) -> Value {
        self.hass
            .services
            .call("media_player", "browse_media", data, Context::new(), true, true)
            .await
            .unwrap()
            .unwrap()
    }
}

/// Poll `check` until it holds, for up to two seconds
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait for `n` recorded calls to `domain.service`; action lists are not
/// awaited by the commands that run them.
pub async fn wait_for_calls(t: &TestHass, domain: &str, service: &str, n: usize) -> Vec<ServiceCall> {
    wait_for(|| async { t.calls(domain, service).len() >= n }).await;
    t.calls(domain, service)
}
