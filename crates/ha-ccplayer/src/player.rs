//! The aggregator media player entity

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ha_config_entries::{ConfigEntry, UpdateListenerId};
use ha_core::{Context, EntityId, STATE_ON, STATE_UNKNOWN};
use ha_event_bus::ListenerHandle;
use ha_mqtt::QoS;
use ha_registries::{DeviceInfo, EntityRegistration};
use ha_state_machine::track_state_change_event;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PlayerConfig;
use crate::constants::*;
use crate::error::PlayerResult;
use crate::hass::Hass;
use crate::mqtt::{parse_playlists, parse_queue, Topics};
use crate::reader::EntityReader;
use crate::state::{DeviceClass, MediaPlayerState};

pub const PLATFORM_DOMAIN: &str = "media_player";

const IMAGE_URL_PREFIXES: [&str; 3] = ["http://", "https://", "/local/"];

/// Values mirrored from the tracked entities at the last refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub state: Option<MediaPlayerState>,
    pub volume_level: Option<f64>,
    pub is_volume_muted: Option<bool>,
    pub source: Option<String>,
    pub source_list: Option<Vec<String>>,
    pub media_title: Option<String>,
    pub media_artist: Option<String>,
    pub media_album_name: Option<String>,
    pub media_image_url: Option<String>,
    /// Seconds
    pub media_duration: Option<f64>,
    /// Seconds
    pub media_position: Option<f64>,
    pub media_position_updated_at: Option<DateTime<Utc>>,
    pub media_album_artist: Option<String>,
    pub media_track: Option<String>,
    pub media_series_title: Option<String>,
    pub media_season: Option<String>,
    pub media_episode: Option<String>,
    pub media_channel: Option<String>,
    pub media_playlist: Option<String>,
    pub sound_mode: Option<String>,
    pub sound_mode_list: Option<Vec<String>>,
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub group_members: Option<Vec<String>>,
    pub repeat: Option<String>,
    pub shuffle: Option<bool>,
}

impl PlayerSnapshot {
    pub fn read(reader: &EntityReader<'_>, config: &PlayerConfig, now: DateTime<Utc>) -> Self {
        let entity = |key: &str| config.entity(key);
        let text = |key: &str| reader.value(entity(key));

        let volume = entity(CONF_VOLUME_ENTITY);
        let volume_level = reader
            .numeric(volume)
            .map(|value| reader.volume_range(volume).to_level(value));

        let media_position = reader
            .numeric(entity(CONF_MEDIA_POSITION_ENTITY))
            .map(|ms| ms / 1000.0);

        let mut snapshot = Self {
            state: None,
            volume_level,
            is_volume_muted: text(CONF_MUTE_ENTITY).map(|v| v == STATE_ON),
            source: text(CONF_SOURCE_ENTITY),
            source_list: options_or_list(reader, entity(CONF_SOURCE_ENTITY), entity(CONF_SOURCE_LIST_ENTITY)),
            media_title: text(CONF_MEDIA_TITLE_ENTITY),
            media_artist: text(CONF_MEDIA_ARTIST_ENTITY),
            media_album_name: text(CONF_MEDIA_ALBUM_ENTITY),
            media_image_url: image_url(reader, entity(CONF_MEDIA_IMAGE_ENTITY)),
            media_duration: reader
                .numeric(entity(CONF_MEDIA_DURATION_ENTITY))
                .map(|ms| ms / 1000.0),
            media_position,
            media_position_updated_at: media_position.map(|_| now),
            media_album_artist: text(CONF_MEDIA_ALBUM_ARTIST_ENTITY),
            media_track: text(CONF_MEDIA_TRACK_ENTITY),
            media_series_title: text(CONF_MEDIA_SERIES_TITLE_ENTITY),
            media_season: text(CONF_MEDIA_SEASON_ENTITY),
            media_episode: text(CONF_MEDIA_EPISODE_ENTITY),
            media_channel: text(CONF_MEDIA_CHANNEL_ENTITY),
            media_playlist: text(CONF_MEDIA_PLAYLIST_ENTITY),
            sound_mode: text(CONF_SOUND_MODE_ENTITY),
            sound_mode_list: options_or_list(
                reader,
                entity(CONF_SOUND_MODE_ENTITY),
                entity(CONF_SOUND_MODE_LIST_ENTITY),
            ),
            app_id: text(CONF_APP_ID_ENTITY),
            app_name: text(CONF_APP_NAME_ENTITY),
            group_members: reader.list(entity(CONF_GROUP_MEMBERS_ENTITY)),
            repeat: text(CONF_REPEAT_STATE_ENTITY),
            shuffle: text(CONF_SHUFFLE_STATE_ENTITY)
                .map(|v| matches!(v.to_lowercase().as_str(), "on" | "true")),
        };
        snapshot.state = snapshot.player_state(reader, config);
        snapshot
    }

    /// Reported player state first, then the power entity
    fn player_state(&self, reader: &EntityReader<'_>, config: &PlayerConfig) -> Option<MediaPlayerState> {
        if let Some(reported) = reader.value(config.entity(CONF_PLAYER_STATE_ENTITY)) {
            return Some(MediaPlayerState::from_reported(&reported).unwrap_or(
                if self.has_active_media() {
                    MediaPlayerState::Playing
                } else {
                    MediaPlayerState::Idle
                },
            ));
        }
        match reader.value(config.entity(CONF_POWER_ENTITY)).as_deref() {
            Some(STATE_ON) if self.has_active_media() => Some(MediaPlayerState::Playing),
            Some(STATE_ON) => Some(MediaPlayerState::On),
            Some("off") => Some(MediaPlayerState::Off),
            _ => None,
        }
    }

    pub fn has_active_media(&self) -> bool {
        self.media_title.is_some()
            || self.media_artist.is_some()
            || self.media_position.is_some_and(|p| p > 0.0)
    }

    pub fn device_class(&self) -> DeviceClass {
        if self.media_title.is_some()
            || self.media_artist.is_some()
            || self.media_album_name.is_some()
            || self.media_image_url.is_some()
        {
            DeviceClass::Tv
        } else {
            DeviceClass::Receiver
        }
    }

    pub fn media_content_type(&self) -> Option<&'static str> {
        (self.media_title.is_some() || self.media_duration.is_some_and(|d| d != 0.0)).then_some("video")
    }

    pub fn state_str(&self) -> &'static str {
        self.state.map_or(STATE_UNKNOWN, |s| s.as_str())
    }
}

/// `options` attribute of `select_entity`, else the list parsed from
/// `list_entity`
fn options_or_list(
    reader: &EntityReader<'_>,
    select_entity: Option<&str>,
    list_entity: Option<&str>,
) -> Option<Vec<String>> {
    reader
        .attribute(select_entity, "options")
        .and_then(|options| serde_json::from_value::<Vec<String>>(options).ok())
        .filter(|options| !options.is_empty())
        .or_else(|| reader.list(list_entity))
}

fn image_url(reader: &EntityReader<'_>, entity_id: Option<&str>) -> Option<String> {
    if let Some(picture) = reader.attribute(entity_id, "entity_picture") {
        return picture.as_str().map(String::from);
    }
    reader
        .raw(entity_id)
        .filter(|state| IMAGE_URL_PREFIXES.iter().any(|p| state.starts_with(p)))
}

pub(crate) struct PlayerInner {
    pub(crate) entry: ConfigEntry,
    pub(crate) config: PlayerConfig,
    pub(crate) snapshot: PlayerSnapshot,
    pub(crate) playlists: Vec<Value>,
    pub(crate) queue: Vec<Value>,
    state_listener: Option<ListenerHandle>,
    mqtt_tasks: Vec<JoinHandle<()>>,
    update_listener: Option<UpdateListenerId>,
}

impl PlayerInner {
    fn detach(&mut self) {
        if let Some(listener) = self.state_listener.take() {
            listener.remove();
        }
        for task in self.mqtt_tasks.drain(..) {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Feed {
    Playlists,
    Queue,
}

/// A `media_player` entity composed from other entities of a config entry
pub struct CcPlayer {
    pub(crate) hass: Arc<Hass>,
    entry_id: String,
    entity_id: EntityId,
    pub(crate) inner: RwLock<PlayerInner>,
}

impl CcPlayer {
    /// Register the player for `entry` and start mirroring its entities
    #[instrument(skip(hass, entry), fields(entry_id = %entry.entry_id))]
    pub async fn add(hass: Arc<Hass>, entry: ConfigEntry) -> PlayerResult<Arc<Self>> {
        let config = PlayerConfig::from_entry(&entry);

        let device = hass.registries.devices.get_or_create(
            DeviceInfo {
                identifiers: vec![config.device_identifier.clone()],
                name: Some(config.name.clone()),
                manufacturer: Some(DEVICE_MANUFACTURER.to_string()),
                model: Some(DEVICE_MODEL.to_string()),
                sw_version: Some(DEVICE_SW_VERSION.to_string()),
            },
            Some(&entry.entry_id),
        );
        let registered = hass.registries.entities.get_or_create(EntityRegistration {
            domain: PLATFORM_DOMAIN,
            platform: DOMAIN,
            unique_id: &entry.entry_id,
            suggested_object_id: Some(&config.name),
            device_id: Some(&device.id),
            config_entry_id: Some(&entry.entry_id),
            original_name: Some(&config.name),
        });
        if let Err(err) = hass.registries.save_all().await {
            warn!(%err, "failed to persist registries");
        }
        let entity_id: EntityId = registered.entity_id.parse()?;
        info!(%entity_id, device_id = %device.id, "adding player");

        let player = Arc::new(Self {
            hass,
            entry_id: entry.entry_id.clone(),
            entity_id,
            inner: RwLock::new(PlayerInner {
                entry,
                config,
                snapshot: PlayerSnapshot::default(),
                playlists: Vec::new(),
                queue: Vec::new(),
                state_listener: None,
                mqtt_tasks: Vec::new(),
                update_listener: None,
            }),
        });

        player.attach().await;

        let weak = Arc::downgrade(&player);
        let update_listener = player
            .hass
            .entries
            .add_update_listener(&player.entry_id, move |entry| {
                let weak = weak.clone();
                async move {
                    if let Some(player) = weak.upgrade() {
                        player.reload(entry).await;
                    }
                }
            });
        player.inner.write().await.update_listener = Some(update_listener);

        Ok(player)
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub async fn config(&self) -> PlayerConfig {
        self.inner.read().await.config.clone()
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.inner.read().await.snapshot.clone()
    }

    pub async fn playlists(&self) -> Vec<Value> {
        self.inner.read().await.playlists.clone()
    }

    pub async fn queue(&self) -> Vec<Value> {
        self.inner.read().await.queue.clone()
    }

    pub(crate) fn topics(config: &PlayerConfig) -> Topics {
        Topics::new(&config.mqtt_base)
    }

    /// Listen to tracked entities, refresh and subscribe to MQTT
    async fn attach(self: &Arc<Self>) {
        let config = self.config().await;

        let weak = Arc::downgrade(self);
        let listener = track_state_change_event(
            &self.hass.bus,
            config.tracked_entities(),
            move |_| {
                let weak = weak.clone();
                async move {
                    if let Some(player) = weak.upgrade() {
                        player.refresh().await;
                    }
                }
            },
        );

        self.refresh().await;
        let tasks = self.subscribe_mqtt(&Self::topics(&config)).await;

        let mut inner = self.inner.write().await;
        inner.state_listener = listener;
        inner.mqtt_tasks = tasks;
    }

    async fn subscribe_mqtt(self: &Arc<Self>, topics: &Topics) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for (filter, feed) in [
            (topics.playlists(), Feed::Playlists),
            (topics.media_queue(), Feed::Queue),
        ] {
            let mut subscription = match self.hass.mqtt.subscribe(&filter, QoS::AtLeastOnce).await {
                Ok(subscription) => subscription,
                Err(err) => {
                    error!(%filter, %err, "failed to subscribe");
                    continue;
                }
            };
            debug!(%filter, "subscribed");
            let weak = Arc::downgrade(self);
            tasks.push(tokio::spawn(async move {
                while let Some(message) = subscription.recv().await {
                    let Some(player) = weak.upgrade() else {
                        break;
                    };
                    player.handle_feed(feed, &message.payload).await;
                }
            }));
        }
        tasks
    }

    async fn handle_feed(&self, feed: Feed, payload: &str) {
        let parsed = match feed {
            Feed::Playlists => parse_playlists(payload),
            Feed::Queue => parse_queue(payload),
        };
        let items = match parsed {
            Ok(items) => items,
            Err(err) => {
                error!(entity_id = %self.entity_id, ?feed, %err, "failed to parse MQTT payload");
                return;
            }
        };
        debug!(entity_id = %self.entity_id, ?feed, count = items.len(), "received MQTT update");
        let mut inner = self.inner.write().await;
        match feed {
            Feed::Playlists => inner.playlists = items,
            Feed::Queue => inner.queue = items,
        }
        self.write_state(&inner);
    }

    /// Re-read every tracked entity and publish the result
    pub async fn refresh(&self) {
        let mut inner = self.inner.write().await;
        let reader = EntityReader::new(&self.hass.states);
        inner.snapshot = PlayerSnapshot::read(&reader, &inner.config, Utc::now());
        self.write_state(&inner);
    }

    /// Apply an updated config entry
    #[instrument(skip(self, entry), fields(entity_id = %self.entity_id))]
    pub async fn reload(self: &Arc<Self>, entry: ConfigEntry) {
        debug!("config entry updated, reloading");
        {
            let mut inner = self.inner.write().await;
            inner.detach();
            inner.config = PlayerConfig::from_entry(&entry);
            inner.entry = entry;
        }
        self.attach().await;
    }

    /// Stop listening and remove the published state
    #[instrument(skip(self), fields(entity_id = %self.entity_id))]
    pub async fn remove(&self) {
        let mut inner = self.inner.write().await;
        inner.detach();
        if let Some(id) = inner.update_listener.take() {
            self.hass.entries.remove_update_listener(&self.entry_id, id);
        }
        self.hass.states.remove(&self.entity_id, Context::new());
        info!("player removed");
    }

    fn write_state(&self, inner: &PlayerInner) {
        let attributes = state_attributes(inner);
        self.hass.states.set(
            self.entity_id.clone(),
            inner.snapshot.state_str(),
            attributes,
            Context::new(),
        );
    }
}

fn state_attributes(inner: &PlayerInner) -> HashMap<String, Value> {
    let snapshot = &inner.snapshot;
    let config = &inner.config;
    let mut attributes = HashMap::new();

    attributes.insert("friendly_name".to_string(), json!(config.name));
    attributes.insert(
        "supported_features".to_string(),
        json!(config.supported_features().bits()),
    );
    attributes.insert("device_class".to_string(), json!(snapshot.device_class().as_str()));

    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            attributes.insert(key.to_string(), value);
        }
    };
    put("volume_level", snapshot.volume_level.map(|v| json!(v)));
    put("is_volume_muted", snapshot.is_volume_muted.map(|v| json!(v)));
    put("source", snapshot.source.as_ref().map(|v| json!(v)));
    put("source_list", snapshot.source_list.as_ref().map(|v| json!(v)));
    put("media_content_type", snapshot.media_content_type().map(|v| json!(v)));
    put("media_title", snapshot.media_title.as_ref().map(|v| json!(v)));
    put("media_artist", snapshot.media_artist.as_ref().map(|v| json!(v)));
    put("media_album_name", snapshot.media_album_name.as_ref().map(|v| json!(v)));
    put("media_image_url", snapshot.media_image_url.as_ref().map(|v| json!(v)));
    put("media_duration", snapshot.media_duration.map(|v| json!(v as i64)));
    put("media_position", snapshot.media_position.map(|v| json!(v as i64)));
    put(
        "media_position_updated_at",
        snapshot.media_position_updated_at.map(|t| json!(t.to_rfc3339())),
    );
    put("media_album_artist", snapshot.media_album_artist.as_ref().map(|v| json!(v)));
    put("media_track", snapshot.media_track.as_ref().map(|v| json!(v)));
    put("media_series_title", snapshot.media_series_title.as_ref().map(|v| json!(v)));
    put("media_season", snapshot.media_season.as_ref().map(|v| json!(v)));
    put("media_episode", snapshot.media_episode.as_ref().map(|v| json!(v)));
    put("media_channel", snapshot.media_channel.as_ref().map(|v| json!(v)));
    put("media_playlist", snapshot.media_playlist.as_ref().map(|v| json!(v)));
    put("sound_mode", snapshot.sound_mode.as_ref().map(|v| json!(v)));
    put("sound_mode_list", snapshot.sound_mode_list.as_ref().map(|v| json!(v)));
    put("app_id", snapshot.app_id.as_ref().map(|v| json!(v)));
    put("app_name", snapshot.app_name.as_ref().map(|v| json!(v)));
    put("group_members", snapshot.group_members.as_ref().map(|v| json!(v)));
    put("repeat", snapshot.repeat.as_ref().map(|v| json!(v)));
    put("shuffle", snapshot.shuffle.map(|v| json!(v)));

    attributes.insert("configured_entities".to_string(), config.entities_attribute());
    attributes.insert("configured_actions".to_string(), config.actions_attribute());
    attributes.insert(
        "config_entry_options".to_string(),
        json!(inner.entry.options),
    );
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_event_bus::EventBus;
    use ha_state_machine::StateMachine;

    fn machine() -> StateMachine {
        StateMachine::new(Arc::new(EventBus::new()))
    }

    fn set(states: &StateMachine, id: &str, value: &str, attributes: Value) {
        let attributes: HashMap<String, Value> = serde_json::from_value(attributes).unwrap();
        states.set(id.parse::<EntityId>().unwrap(), value, attributes, Context::new());
    }

    fn config(options: Value) -> PlayerConfig {
        let options: HashMap<String, Value> = serde_json::from_value(options).unwrap();
        PlayerConfig::from_entry(&ConfigEntry::new(DOMAIN, "Player").with_options(options))
    }

    #[tokio::test]
    async fn test_reported_state_wins_over_power() {
        let states = machine();
        set(&states, "sensor.state", "PAUSED", json!({}));
        set(&states, "switch.power", "off", json!({}));
        let config = config(json!({
            "player_state_entity": "sensor.state",
            "power_entity": "switch.power",
        }));
        let snapshot = PlayerSnapshot::read(&EntityReader::new(&states), &config, Utc::now());
        assert_eq!(snapshot.state, Some(MediaPlayerState::Paused));
    }

    #[tokio::test]
    async fn test_unmapped_state_uses_active_media() {
        let states = machine();
        set(&states, "sensor.state", "loading", json!({}));
        set(&states, "sensor.position", "1500", json!({}));
        let config = config(json!({
            "player_state_entity": "sensor.state",
            "media_position_entity": "sensor.position",
        }));
        let reader = EntityReader::new(&states);
        let snapshot = PlayerSnapshot::read(&reader, &config, Utc::now());
        assert_eq!(snapshot.state, Some(MediaPlayerState::Playing));
        assert_eq!(snapshot.media_position, Some(1.5));
        assert!(snapshot.media_position_updated_at.is_some());

        set(&states, "sensor.position", "0", json!({}));
        let snapshot = PlayerSnapshot::read(&reader, &config, Utc::now());
        assert_eq!(snapshot.state, Some(MediaPlayerState::Idle));
    }

    #[tokio::test]
    async fn test_power_fallback() {
        let states = machine();
        set(&states, "switch.power", "on", json!({}));
        let reader = EntityReader::new(&states);
        let cfg = config(json!({
            "power_entity": "switch.power",
            "player_state_entity": "sensor.state",
            "media_title_entity": "sensor.title",
        }));
        // player state entity configured but missing
        assert_eq!(
            PlayerSnapshot::read(&reader, &cfg, Utc::now()).state,
            Some(MediaPlayerState::On)
        );

        set(&states, "sensor.title", "News", json!({}));
        assert_eq!(
            PlayerSnapshot::read(&reader, &cfg, Utc::now()).state,
            Some(MediaPlayerState::Playing)
        );

        set(&states, "switch.power", "off", json!({}));
        assert_eq!(
            PlayerSnapshot::read(&reader, &cfg, Utc::now()).state,
            Some(MediaPlayerState::Off)
        );

        set(&states, "switch.power", "unavailable", json!({}));
        let snapshot = PlayerSnapshot::read(&reader, &cfg, Utc::now());
        assert_eq!(snapshot.state, None);
        assert_eq!(snapshot.state_str(), "unknown");
    }

    #[tokio::test]
    async fn test_media_fields() {
        let states = machine();
        set(&states, "number.volume", "30", json!({"min": 0, "max": 60}));
        set(&states, "switch.mute", "on", json!({}));
        set(&states, "input_select.source", "HDMI 1", json!({"options": ["HDMI 1", "TV"]}));
        set(&states, "sensor.duration", "90500", json!({}));
        set(&states, "image.thumb", "2024-01-01T00:00:00", json!({"entity_picture": "/api/image_proxy/image.thumb"}));
        set(&states, "sensor.members", r#"["media_player.a", "media_player.b"]"#, json!({}));
        set(&states, "input_boolean.shuffle", "on", json!({}));
        set(&states, "sensor.repeat", "all", json!({}));
        let cfg = config(json!({
            "volume_entity": "number.volume",
            "mute_entity": "switch.mute",
            "source_entity": "input_select.source",
            "source_list_entity": "sensor.unused",
            "media_duration_entity": "sensor.duration",
            "media_image_entity": "image.thumb",
            "group_members_entity": "sensor.members",
            "shuffle_state_entity": "input_boolean.shuffle",
            "repeat_state_entity": "sensor.repeat",
        }));
        let snapshot = PlayerSnapshot::read(&EntityReader::new(&states), &cfg, Utc::now());

        assert_eq!(snapshot.volume_level, Some(0.5));
        assert_eq!(snapshot.is_volume_muted, Some(true));
        assert_eq!(snapshot.source.as_deref(), Some("HDMI 1"));
        assert_eq!(snapshot.source_list, Some(vec!["HDMI 1".to_string(), "TV".to_string()]));
        assert_eq!(snapshot.media_duration, Some(90.5));
        assert_eq!(snapshot.media_image_url.as_deref(), Some("/api/image_proxy/image.thumb"));
        assert_eq!(snapshot.group_members.as_ref().map(Vec::len), Some(2));
        assert_eq!(snapshot.shuffle, Some(true));
        assert_eq!(snapshot.repeat.as_deref(), Some("all"));
        assert_eq!(snapshot.device_class(), DeviceClass::Tv);
        assert_eq!(snapshot.media_content_type(), Some("video"));
        assert_eq!(snapshot.state, None);
    }

    #[tokio::test]
    async fn test_image_from_state_url() {
        let states = machine();
        set(&states, "image.cover", "https://img.example.com/a.jpg", json!({}));
        set(&states, "image.other", "idle", json!({}));
        let reader = EntityReader::new(&states);
        assert_eq!(
            image_url(&reader, Some("image.cover")).as_deref(),
            Some("https://img.example.com/a.jpg")
        );
        assert_eq!(image_url(&reader, Some("image.other")), None);
    }

    #[test]
    fn test_empty_snapshot_is_receiver() {
        let snapshot = PlayerSnapshot::default();
        assert_eq!(snapshot.device_class(), DeviceClass::Receiver);
        assert_eq!(snapshot.media_content_type(), None);
        assert!(!snapshot.has_active_media());
    }
}
