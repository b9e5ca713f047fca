//! Home Assistant Rust Server
//!
//! Hosts the built-in helpers and the ccplayer integration.
//!
//! ```text
//! homeassistant [CONFIG_DIR]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ha_ccplayer::{Hass, HassUrls};
use ha_components::{
    load_input_booleans, load_input_numbers, load_input_selects, register_homeassistant_services,
    register_input_boolean_services, register_input_number_services,
    register_input_select_services,
};
use ha_config::Configuration;
use ha_mqtt::{LoopbackMqtt, RumqttcClient, SharedMqtt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    info!(?config_dir, "Starting Home Assistant (Rust)");

    let config = Configuration::load(&config_dir).context("loading configuration")?;
    let shutdown = CancellationToken::new();

    let mqtt_client = config
        .mqtt
        .is_configured()
        .then(|| RumqttcClient::connect(&config.mqtt, shutdown.clone()));
    let mqtt: SharedMqtt = match &mqtt_client {
        Some(client) => client.clone(),
        None => {
            warn!("no MQTT broker configured, using the in-process broker");
            Arc::new(LoopbackMqtt::new())
        }
    };

    let urls = HassUrls {
        external_url: config.homeassistant.external_url.clone(),
        internal_url: config.homeassistant.internal_url.clone(),
    };
    let hass = Arc::new(Hass::new(&config_dir, mqtt, urls));
    hass.registries.load_all().await.context("loading registries")?;
    hass.entries.load().await.context("loading config entries")?;

    register_homeassistant_services(&hass.services);
    register_input_boolean_services(&hass.services, hass.states.clone());
    register_input_number_services(&hass.services, hass.states.clone());
    register_input_select_services(&hass.services, hass.states.clone());
    let helpers = load_input_booleans(&config.input_boolean, &hass.states)
        + load_input_numbers(&config.input_number, &hass.states)
        + load_input_selects(&config.input_select, &hass.states);
    info!(helpers, "helpers loaded");

    let integration = ha_ccplayer::async_setup(&hass);
    for (entry_id, result) in hass.entries.setup_all().await {
        if let Err(e) = result {
            warn!(%entry_id, "setup failed: {}", e);
        }
    }
    let discovery = ha_ccplayer::watch_discovery(hass.clone(), &config.mqtt.discovery_topic)
        .await
        .context("subscribing to discovery")?;

    info!(
        name = %config.homeassistant.name,
        players = integration.len(),
        "Home Assistant is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    discovery.abort();
    for entry in hass.entries.get_by_domain(ha_ccplayer::constants::DOMAIN) {
        if let Err(e) = hass.entries.unload(&entry.entry_id).await {
            warn!(entry_id = %entry.entry_id, "unload failed: {}", e);
        }
    }
    hass.registries.save_all().await.context("saving registries")?;
    hass.entries.save().await.context("saving config entries")?;
    if let Some(client) = mqtt_client {
        client.disconnect().await;
    }
    shutdown.cancel();

    Ok(())
}
