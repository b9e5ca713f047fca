//! Typed view of `configuration.yaml`

use std::collections::HashMap;
use std::path::Path;

use ha_components::{InputBooleanConfig, InputNumberConfig, InputSelectConfig};
use ha_mqtt::MqttConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

pub const CONFIG_FILE: &str = "configuration.yaml";

/// `homeassistant:` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub internal_url: Option<String>,
}

fn default_name() -> String {
    "Home".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            external_url: None,
            internal_url: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub homeassistant: CoreConfig,
    pub mqtt: MqttConfig,
    pub input_boolean: HashMap<String, Option<InputBooleanConfig>>,
    pub input_number: HashMap<String, InputNumberConfig>,
    pub input_select: HashMap<String, InputSelectConfig>,
}

impl Configuration {
    /// Load `configuration.yaml` from `config_dir`. Without one every
    /// section takes its defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            warn!(?config_dir, "no {CONFIG_FILE}, using defaults");
            return Ok(Self::default());
        }
        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            name = %config.homeassistant.name,
            input_boolean = config.input_boolean.len(),
            input_number = config.input_number.len(),
            input_select = config.input_select.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Sections other than the known ones are ignored
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        Ok(Self {
            homeassistant: section(yaml, "homeassistant")?,
            mqtt: section(yaml, "mqtt")?,
            input_boolean: section(yaml, "input_boolean")?,
            input_number: section(yaml, "input_number")?,
            input_select: section(yaml, "input_select")?,
        })
    }
}

/// A missing or empty section reads as its default
fn section<T: DeserializeOwned + Default>(yaml: &Value, name: &str) -> ConfigResult<T> {
    match yaml.get(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|source| ConfigError::Section {
            section: name.to_string(),
            source,
        }),
    }
}
