//! Handles to the host runtime the integration runs in

use std::path::Path;
use std::sync::Arc;

use ha_config_entries::{ConfigEntries, FlowManager};
use ha_event_bus::EventBus;
use ha_mqtt::SharedMqtt;
use ha_registries::Registries;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use ha_template::TemplateEngine;

/// Where the instance can be reached; used to make relative media URLs
/// absolute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HassUrls {
    pub external_url: Option<String>,
    pub internal_url: Option<String>,
}

impl HassUrls {
    pub fn base_url(&self) -> Option<&str> {
        [&self.external_url, &self.internal_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|url| !url.is_empty())
    }
}

pub struct Hass {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    pub templates: Arc<TemplateEngine>,
    pub registries: Arc<Registries>,
    pub entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
    pub mqtt: SharedMqtt,
    pub urls: HassUrls,
}

impl Hass {
    /// Wire a fresh runtime persisting under `config_dir/.storage`.
    /// Stored registries and entries are not loaded yet.
    pub fn new(config_dir: impl AsRef<Path>, mqtt: SharedMqtt, urls: HassUrls) -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::with_bus(bus.clone()));
        let templates = Arc::new(TemplateEngine::new(states.clone()));
        let registries = Arc::new(Registries::new(config_dir));
        let entries = Arc::new(ConfigEntries::with_registries(registries.clone()));
        let flows = Arc::new(FlowManager::new(entries.clone()));
        Self {
            bus,
            states,
            services,
            templates,
            registries,
            entries,
            flows,
            mqtt,
            urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let mut urls = HassUrls::default();
        assert_eq!(urls.base_url(), None);
        urls.internal_url = Some("http://10.0.0.2:8123".into());
        assert_eq!(urls.base_url(), Some("http://10.0.0.2:8123"));
        urls.external_url = Some("https://ha.example.com".into());
        assert_eq!(urls.base_url(), Some("https://ha.example.com"));
    }
}
