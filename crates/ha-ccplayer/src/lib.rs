//! CC Player
//!
//! A virtual `media_player` composed from entities that already exist:
//! state, volume, source and media metadata are mirrored from the
//! configured role entities, commands either call services on them
//! directly or run the user's action lists. A companion device reports
//! its playlists and play queue over MQTT and is driven the same way.
//!
//! [`async_setup`] registers everything with a [`Hass`]:
//!
//! - the config entry handler creating one [`CcPlayer`] per entry
//! - the config flow (`mqtt` discovery, `confirm`, `user`) and the options flow
//! - the `media_player.*` services

mod actions;
mod browse;
mod commands;
mod config;
mod config_flow;
pub mod constants;
mod error;
mod hass;
mod mqtt;
mod options_flow;
mod player;
mod reader;
mod services;
mod state;

pub use browse::{BrowseError, BrowseMedia, MediaClass};
pub use commands::PlayMedia;
pub use config::PlayerConfig;
pub use config_flow::CcPlayerConfigFlow;
pub use error::{PlayerError, PlayerResult};
pub use hass::{Hass, HassUrls};
pub use mqtt::Topics;
pub use options_flow::CcPlayerOptionsFlow;
pub use player::{CcPlayer, PlayerSnapshot, PLATFORM_DOMAIN};
pub use reader::VolumeRange;
pub use services::Players;
pub use state::{DeviceClass, MediaPlayerFeature, MediaPlayerState};

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, ConfigEntrySource, FlowHandler, FlowOutcome, IntegrationHandler};
use ha_mqtt::{MqttResult, QoS};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::DOMAIN;

/// Config entry handler owning the loaded players
pub struct CcPlayerIntegration {
    hass: Weak<Hass>,
    players: Arc<Players>,
}

impl CcPlayerIntegration {
    /// Player of the loaded entry `entry_id`
    pub fn player_for_entry(&self, entry_id: &str) -> Option<Arc<CcPlayer>> {
        self.players
            .iter()
            .find(|p| p.entry_id() == entry_id)
            .map(|p| p.value().clone())
    }

    pub fn player(&self, entity_id: &str) -> Option<Arc<CcPlayer>> {
        self.players.get(entity_id).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[async_trait]
impl IntegrationHandler for CcPlayerIntegration {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), String> {
        let hass = self
            .hass
            .upgrade()
            .ok_or_else(|| "runtime is shutting down".to_string())?;
        let player = CcPlayer::add(hass, entry.clone())
            .await
            .map_err(|err| err.to_string())?;
        self.players.insert(player.entity_id().to_string(), player);
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), String> {
        let Some(player) = self.player_for_entry(&entry.entry_id) else {
            debug!(entry_id = %entry.entry_id, "entry has no player");
            return Ok(());
        };
        self.players.remove(&player.entity_id().to_string());
        player.remove().await;
        Ok(())
    }
}

/// Register the integration with `hass`
pub fn async_setup(hass: &Arc<Hass>) -> Arc<CcPlayerIntegration> {
    let integration = Arc::new(CcPlayerIntegration {
        hass: Arc::downgrade(hass),
        players: Arc::new(Players::new()),
    });
    hass.entries.register_handler(DOMAIN, integration.clone());

    let registries = hass.registries.clone();
    hass.flows.register_config_flow(DOMAIN, move |_source| {
        Box::new(CcPlayerConfigFlow::new(registries.clone())) as Box<dyn FlowHandler>
    });
    hass.flows
        .register_options_flow(DOMAIN, |entry| {
            Box::new(CcPlayerOptionsFlow::new(entry)) as Box<dyn FlowHandler>
        });

    services::register_media_player_services(&hass.services, &integration.players);
    info!("{} integration set up", DOMAIN);
    integration
}

/// Start a config flow for a discovery message
pub async fn handle_discovery(hass: &Hass, payload: &str) -> FlowOutcome {
    hass.flows
        .start_config_flow(DOMAIN, ConfigEntrySource::Mqtt, Some(Value::String(payload.to_string())))
        .await
}

/// Feed every message on `topic` to [`handle_discovery`] until the task
/// is aborted or the client goes away.
pub async fn watch_discovery(hass: Arc<Hass>, topic: &str) -> MqttResult<JoinHandle<()>> {
    let mut subscription = hass.mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    info!(%topic, "listening for discovery");
    Ok(tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            match handle_discovery(&hass, &message.payload).await {
                Ok(result) => {
                    debug!(result_type = ?result.result_type, reason = ?result.reason, "discovery flow")
                }
                Err(err) => warn!(%err, "discovery flow failed"),
            }
        }
    }))
}
