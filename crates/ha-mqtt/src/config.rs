use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID: &str = "homeassistant-rs";
pub const DEFAULT_DISCOVERY_TOPIC: &str = "ccplayer/discovery";

/// `mqtt:` section of `configuration.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host; without one the loopback broker is used
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Where integrations announce themselves for discovery
    #[serde(default = "default_discovery_topic")]
    pub discovery_topic: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_discovery_topic() -> String {
    DEFAULT_DISCOVERY_TOPIC.to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            client_id: default_client_id(),
            discovery_topic: default_discovery_topic(),
        }
    }
}

impl MqttConfig {
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.is_empty())
    }
}
