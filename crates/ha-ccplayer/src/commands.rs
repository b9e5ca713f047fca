//! Player commands: direct service calls on the tracked entities, or the
//! user's action lists

use ha_core::{Context, EntityId};
use ha_mqtt::QoS;
use serde_json::{json, Map, Value};
use tracing::{debug, error, instrument, warn};

use crate::actions::run_action_list;
use crate::browse::{find_playlist, BrowseMedia, BrowseSource, PLAYLIST_PREFIX, SOURCE_PREFIX};
use crate::constants::*;
use crate::error::PlayerResult;
use crate::mqtt::{
    load_playlist_payload, load_url_payload, play_from_queue_payload, CMD_GET_PLAYLISTS,
    CMD_LOAD_PLAYLIST, CMD_LOAD_URL, CMD_PLAY_FROM_QUEUE,
};
use crate::player::CcPlayer;
use crate::reader::EntityReader;
use crate::state::MediaPlayerState;

/// Arguments of `play_media`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayMedia {
    pub media_type: String,
    pub media_id: String,
    pub enqueue: Option<String>,
    pub announce: Option<bool>,
    /// Additional variables handed to the action templates
    pub extra: Map<String, Value>,
}

impl CcPlayer {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
        context: &Context,
    ) -> PlayerResult<()> {
        self.hass
            .services
            .call(domain, service, data, context.child(), true, false)
            .await?;
        Ok(())
    }

    async fn run_actions(&self, key: &str, variables: Value, context: &Context) -> usize {
        let actions = self.inner.read().await.config.action(key).cloned();
        run_action_list(
            &self.hass.services,
            &self.hass.templates,
            key,
            actions.as_ref(),
            &variables,
            context,
        )
        .await
    }

    async fn entity(&self, key: &str) -> Option<String> {
        self.inner.read().await.config.entity(key).map(String::from)
    }

    async fn publish(&self, command: &str, payload: &str) -> PlayerResult<()> {
        let topic = Self::topics(&self.config().await).command(command);
        debug!(%topic, %payload, "publishing");
        self.hass
            .mqtt
            .publish(&topic, payload, QoS::AtLeastOnce, false)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn turn_on(&self, context: &Context) -> PlayerResult<()> {
        self.switch_entity(CONF_POWER_ENTITY, "turn_on", context).await
    }

    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn turn_off(&self, context: &Context) -> PlayerResult<()> {
        self.switch_entity(CONF_POWER_ENTITY, "turn_off", context).await
    }

    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn mute_volume(&self, mute: bool, context: &Context) -> PlayerResult<()> {
        let service = if mute { "turn_on" } else { "turn_off" };
        self.switch_entity(CONF_MUTE_ENTITY, service, context).await
    }

    async fn switch_entity(&self, key: &str, service: &str, context: &Context) -> PlayerResult<()> {
        let Some(entity_id) = self.entity(key).await else {
            debug!(role = key, "no entity configured");
            return Ok(());
        };
        self.call_service("homeassistant", service, json!({ "entity_id": entity_id }), context)
            .await
    }

    /// Write `value` (entity scale) to the volume entity, clamped to its range
    async fn set_volume_value(&self, value: f64, context: &Context) {
        let Some(entity_id) = self.entity(CONF_VOLUME_ENTITY).await else {
            debug!("no volume entity configured");
            return;
        };
        let range = EntityReader::new(&self.hass.states).volume_range(Some(&entity_id));
        let value = range.clamp(value);
        let domain = match entity_id.parse::<EntityId>() {
            Ok(id) => id.domain().to_string(),
            Err(err) => {
                error!(%entity_id, %err, "invalid volume entity");
                return;
            }
        };
        let data = json!({ "entity_id": entity_id, "value": value });
        if let Err(err) = self.call_service(&domain, "set_value", data, context).await {
            error!(%entity_id, value, %err, "failed to set volume");
        }
    }

    /// `level` is 0..1 and scaled to the volume entity's range
    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn set_volume_level(&self, level: f64, context: &Context) {
        let Some(entity_id) = self.entity(CONF_VOLUME_ENTITY).await else {
            return;
        };
        let range = EntityReader::new(&self.hass.states).volume_range(Some(&entity_id));
        self.set_volume_value(range.to_value(level), context).await;
    }

    pub async fn volume_up(&self, context: &Context) {
        self.step_volume(1.0, context).await
    }

    pub async fn volume_down(&self, context: &Context) {
        self.step_volume(-1.0, context).await
    }

    async fn step_volume(&self, direction: f64, context: &Context) {
        let (entity_id, step) = {
            let inner = self.inner.read().await;
            (
                inner.config.entity(CONF_VOLUME_ENTITY).map(String::from),
                inner.config.volume_step,
            )
        };
        let Some(entity_id) = entity_id else {
            return;
        };
        let reader = EntityReader::new(&self.hass.states);
        let Some(current) = reader.numeric(Some(&entity_id)) else {
            warn!(%entity_id, "volume entity has no numeric value");
            return;
        };
        let range = reader.volume_range(Some(&entity_id));
        self.set_volume_value(current + direction * step * range.span(), context)
            .await;
    }

    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn select_source(&self, source: &str, context: &Context) {
        let Some(entity_id) = self.entity(CONF_SOURCE_ENTITY).await else {
            debug!("no source entity configured");
            return;
        };
        self.select_option(&entity_id, source, context).await;
    }

    async fn select_option(&self, entity_id: &str, option: &str, context: &Context) {
        let domain = match entity_id.parse::<EntityId>() {
            Ok(id) => id.domain().to_string(),
            Err(err) => {
                error!(%entity_id, %err, "invalid entity id");
                return;
            }
        };
        let data = json!({ "entity_id": entity_id, "option": option });
        if let Err(err) = self.call_service(&domain, "select_option", data, context).await {
            error!(%entity_id, %option, %err, "failed to select option");
        }
    }

    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn select_sound_mode(&self, sound_mode: &str, context: &Context) {
        let has_action = self
            .inner
            .read()
            .await
            .config
            .has_action(CONF_SELECT_SOUND_MODE_ACTION);
        if has_action {
            self.run_actions(
                CONF_SELECT_SOUND_MODE_ACTION,
                json!({ "sound_mode": sound_mode }),
                context,
            )
            .await;
            return;
        }
        match self.entity(CONF_SOUND_MODE_ENTITY).await {
            Some(entity_id) => self.select_option(&entity_id, sound_mode, context).await,
            None => debug!("no sound mode action or entity configured"),
        }
    }

    pub async fn media_play(&self, context: &Context) {
        self.run_actions(CONF_PLAY_ACTION, json!({}), context).await;
    }

    pub async fn media_pause(&self, context: &Context) {
        self.run_actions(CONF_PAUSE_ACTION, json!({}), context).await;
    }

    pub async fn media_stop(&self, context: &Context) {
        self.run_actions(CONF_STOP_ACTION, json!({}), context).await;
    }

    pub async fn media_next_track(&self, context: &Context) {
        self.run_actions(CONF_NEXT_ACTION, json!({}), context).await;
    }

    pub async fn media_previous_track(&self, context: &Context) {
        self.run_actions(CONF_PREVIOUS_ACTION, json!({}), context).await;
    }

    pub async fn clear_playlist(&self, context: &Context) {
        self.run_actions(CONF_CLEAR_PLAYLIST_ACTION, json!({}), context).await;
    }

    pub async fn open(&self, context: &Context) {
        self.run_actions(CONF_OPEN_ACTION, json!({}), context).await;
    }

    pub async fn close(&self, context: &Context) {
        self.run_actions(CONF_CLOSE_ACTION, json!({}), context).await;
    }

    pub async fn set_shuffle(&self, shuffle: bool, context: &Context) {
        self.run_actions(CONF_SHUFFLE_SET_ACTION, json!({ "shuffle": shuffle }), context)
            .await;
    }

    pub async fn set_repeat(&self, repeat: &str, context: &Context) {
        self.run_actions(CONF_REPEAT_SET_ACTION, json!({ "repeat": repeat }), context)
            .await;
    }

    /// Toggle action, else toggle the power entity
    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn toggle(&self, context: &Context) -> PlayerResult<()> {
        if self.inner.read().await.config.has_action(CONF_TOGGLE_ACTION) {
            self.run_actions(CONF_TOGGLE_ACTION, json!({}), context).await;
            return Ok(());
        }
        self.switch_entity(CONF_POWER_ENTITY, "toggle", context).await
    }

    /// Play/pause action, else pause while playing and play otherwise
    pub async fn media_play_pause(&self, context: &Context) {
        let (has_action, state) = {
            let inner = self.inner.read().await;
            (
                inner.config.has_action(CONF_PLAY_PAUSE_ACTION),
                inner.snapshot.state,
            )
        };
        if has_action {
            self.run_actions(CONF_PLAY_PAUSE_ACTION, json!({}), context).await;
        } else if state == Some(MediaPlayerState::Playing) {
            self.media_pause(context).await;
        } else {
            self.media_play(context).await;
        }
    }

    /// Seek to `position` seconds. The action receives the position as a
    /// percentage of the duration when one is known.
    #[instrument(skip(self, context), fields(entity_id = %self.entity_id()))]
    pub async fn media_seek(&self, position: f64, context: &Context) {
        let (has_action, duration) = {
            let inner = self.inner.read().await;
            (
                inner.config.has_action(CONF_SEEK_ACTION),
                inner.snapshot.media_duration,
            )
        };
        if !has_action {
            debug!("no seek action configured");
            return;
        }
        let seek_position = match duration {
            Some(duration) if duration > 0.0 => position / duration * 100.0,
            _ => position,
        };
        self.run_actions(
            CONF_SEEK_ACTION,
            json!({
                "position": position,
                "seek_position": seek_position,
                "position_pct": seek_position,
            }),
            context,
        )
        .await;
    }

    #[instrument(skip(self, request, context), fields(entity_id = %self.entity_id(), media_id = %request.media_id))]
    pub async fn play_media(&self, request: PlayMedia, context: &Context) -> PlayerResult<()> {
        let media_id = request.media_id.as_str();

        if let Some(index) = media_id.strip_prefix(PLAYLIST_PREFIX) {
            let title = {
                let inner = self.inner.read().await;
                find_playlist(&inner.playlists, index).map(String::from)
            };
            return match title {
                Some(title) => {
                    self.publish(CMD_LOAD_PLAYLIST, &load_playlist_payload(&title))
                        .await
                }
                None => {
                    warn!(%index, "playlist not found");
                    Ok(())
                }
            };
        }

        if let Some(title) = media_id.strip_prefix(SOURCE_PREFIX) {
            if title.is_empty() {
                warn!("empty source title");
                return Ok(());
            }
            return self
                .publish(CMD_PLAY_FROM_QUEUE, &play_from_queue_payload(title))
                .await;
        }

        if self.inner.read().await.config.has_action(CONF_PLAY_MEDIA_ACTION) {
            let mut variables = Map::new();
            variables.insert("media_type".into(), json!(request.media_type));
            variables.insert("media_id".into(), json!(request.media_id));
            variables.insert("media_content_type".into(), json!(request.media_type));
            variables.insert("media_content_id".into(), json!(request.media_id));
            variables.insert("enqueue".into(), json!(request.enqueue));
            variables.insert("announce".into(), json!(request.announce));
            variables.extend(request.extra);
            self.run_actions(CONF_PLAY_MEDIA_ACTION, Value::Object(variables), context)
                .await;
            return Ok(());
        }

        if media_id.starts_with("http://") || media_id.starts_with("https://") {
            return self.publish(CMD_LOAD_URL, &load_url_payload(media_id)).await;
        }

        warn!("no handler for media id");
        Ok(())
    }

    /// Browse tree node for `content_id`. Asks the companion for its
    /// playlists while none are known.
    #[instrument(skip(self), fields(entity_id = %self.entity_id()))]
    pub async fn browse_media(&self, content_id: Option<&str>) -> PlayerResult<BrowseMedia> {
        let (playlists, queue) = {
            let inner = self.inner.read().await;
            (inner.playlists.clone(), inner.queue.clone())
        };
        if playlists.is_empty() {
            if let Err(err) = self.publish(CMD_GET_PLAYLISTS, "").await {
                warn!(%err, "failed to request playlists");
            }
        }
        let source = BrowseSource {
            playlists: &playlists,
            queue: &queue,
            base_url: self.hass.urls.base_url(),
        };
        Ok(source.browse(content_id)?)
    }
}
