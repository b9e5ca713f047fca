//! `media_player.*` services, routed by entity_id to the loaded players

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use ha_core::{ServiceCall, SupportsResponse};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::commands::PlayMedia;
use crate::error::PlayerError;
use crate::player::{CcPlayer, PLATFORM_DOMAIN};

/// Loaded players keyed by entity id
pub type Players = DashMap<String, Arc<CcPlayer>>;

const SERVICES: &[(&str, &str)] = &[
    ("turn_on", "Turn on"),
    ("turn_off", "Turn off"),
    ("toggle", "Toggle"),
    ("volume_up", "Turn up volume"),
    ("volume_down", "Turn down volume"),
    ("volume_set", "Set volume"),
    ("volume_mute", "Mute volume"),
    ("media_play", "Play"),
    ("media_pause", "Pause"),
    ("media_stop", "Stop"),
    ("media_play_pause", "Play/Pause"),
    ("media_next_track", "Next"),
    ("media_previous_track", "Previous"),
    ("media_seek", "Seek"),
    ("select_source", "Select source"),
    ("select_sound_mode", "Select sound mode"),
    ("play_media", "Play media"),
    ("clear_playlist", "Clear playlist"),
    ("shuffle_set", "Shuffle"),
    ("repeat_set", "Repeat"),
];

impl From<PlayerError> for ServiceError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::Service(err) => err,
            other => ServiceError::CallFailed(other.to_string()),
        }
    }
}

fn required<T: DeserializeOwned>(call: &ServiceCall, key: &str) -> Result<T, ServiceError> {
    call.get(key)
        .ok_or_else(|| ServiceError::InvalidData(format!("{} requires {key}", call.service_id())))
}

fn targeted(players: &Players, call: &ServiceCall) -> Vec<Arc<CcPlayer>> {
    let found: Vec<_> = call
        .entity_ids()
        .iter()
        .filter_map(|id| players.get(id).map(|p| p.clone()))
        .collect();
    if found.is_empty() {
        debug!(service = %call.service_id(), "no player targeted");
    }
    found
}

async fn dispatch(player: &CcPlayer, call: &ServiceCall) -> Result<(), ServiceError> {
    let context = &call.context;
    match call.service.as_str() {
        "turn_on" => player.turn_on(context).await?,
        "turn_off" => player.turn_off(context).await?,
        "toggle" => player.toggle(context).await?,
        "volume_up" => player.volume_up(context).await,
        "volume_down" => player.volume_down(context).await,
        "volume_set" => {
            player
                .set_volume_level(required(call, "volume_level")?, context)
                .await
        }
        "volume_mute" => {
            player
                .mute_volume(required(call, "is_volume_muted")?, context)
                .await?
        }
        "media_play" => player.media_play(context).await,
        "media_pause" => player.media_pause(context).await,
        "media_stop" => player.media_stop(context).await,
        "media_play_pause" => player.media_play_pause(context).await,
        "media_next_track" => player.media_next_track(context).await,
        "media_previous_track" => player.media_previous_track(context).await,
        "media_seek" => {
            player
                .media_seek(required(call, "seek_position")?, context)
                .await
        }
        "select_source" => {
            let source: String = required(call, "source")?;
            player.select_source(&source, context).await
        }
        "select_sound_mode" => {
            let sound_mode: String = required(call, "sound_mode")?;
            player.select_sound_mode(&sound_mode, context).await
        }
        "play_media" => {
            let request = PlayMedia {
                media_type: required(call, "media_content_type")?,
                media_id: required(call, "media_content_id")?,
                enqueue: call.get("enqueue"),
                announce: call.get("announce"),
                extra: call.get::<Map<String, Value>>("extra").unwrap_or_default(),
            };
            player.play_media(request, context).await?
        }
        "clear_playlist" => player.clear_playlist(context).await,
        "shuffle_set" => player.set_shuffle(required(call, "shuffle")?, context).await,
        "repeat_set" => {
            let repeat: String = required(call, "repeat")?;
            player.set_repeat(&repeat, context).await
        }
        other => {
            return Err(ServiceError::NotFound {
                domain: PLATFORM_DOMAIN.to_string(),
                service: other.to_string(),
            })
        }
    }
    Ok(())
}

async fn handle(players: Weak<Players>, call: ServiceCall) -> Result<Option<Value>, ServiceError> {
    let Some(players) = players.upgrade() else {
        return Ok(None);
    };
    // every targeted player gets the call; the first failure is reported
    let mut first_error = None;
    for player in targeted(&players, &call) {
        if let Err(err) = dispatch(&player, &call).await {
            warn!(entity_id = %player.entity_id(), %err, "{} failed", call.service_id());
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(None), Err)
}

async fn handle_browse(players: Weak<Players>, call: ServiceCall) -> Result<Option<Value>, ServiceError> {
    let Some(players) = players.upgrade() else {
        return Ok(None);
    };
    // a response is always expected, so an untargeted browse is an error
    let Some(player) = targeted(&players, &call).into_iter().next() else {
        return Err(ServiceError::InvalidData("browse_media requires a ccplayer entity".into()));
    };
    let content_id: Option<String> = call.get("media_content_id");
    let node = player.browse_media(content_id.as_deref()).await?;
    serde_json::to_value(node)
        .map(Some)
        .map_err(|err| ServiceError::CallFailed(err.to_string()))
}

pub fn register_media_player_services(services: &ServiceRegistry, players: &Arc<Players>) {
    let target = json!({"entity": {"domain": PLATFORM_DOMAIN}});
    for (service, name) in SERVICES {
        let players = Arc::downgrade(players);
        services.register_with_description(
            ServiceDescription::new(PLATFORM_DOMAIN, *service)
                .with_name(*name)
                .with_target(target.clone()),
            move |call: ServiceCall| handle(players.clone(), call),
        );
    }

    let players = Arc::downgrade(players);
    services.register_with_description(
        ServiceDescription::new(PLATFORM_DOMAIN, "browse_media")
            .with_name("Browse media")
            .with_target(target)
            .with_supports_response(SupportsResponse::Only),
        move |call: ServiceCall| handle_browse(players.clone(), call),
    );
    info!(count = SERVICES.len() + 1, "media_player services registered");
}
