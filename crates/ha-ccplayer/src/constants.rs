//! Keys and defaults shared by the flows and the player

pub const DOMAIN: &str = "ccplayer";
pub const DEFAULT_PREFIX: &str = "ccplayer";
pub const DEFAULT_NAME: &str = "CC Player";
pub const DEFAULT_VOLUME_STEP: f64 = 0.05;

pub const DEVICE_MANUFACTURER: &str = "CC Player";
pub const DEVICE_MODEL: &str = "Virtual Media Player";
pub const DEVICE_SW_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CONF_NAME: &str = "name";
pub const CONF_LINKED_DEVICE_ID: &str = "linked_device_id";
pub const CONF_LINKED_DEVICE_IDENTIFIER: &str = "linked_device_identifier";
pub const CONF_DEVICE_ID: &str = "device_id";

// Basic controls
pub const CONF_POWER_ENTITY: &str = "power_entity";
pub const CONF_PLAYER_STATE_ENTITY: &str = "player_state_entity";
pub const CONF_VOLUME_ENTITY: &str = "volume_entity";
pub const CONF_MUTE_ENTITY: &str = "mute_entity";
pub const CONF_SOURCE_ENTITY: &str = "source_entity";
pub const CONF_SOURCE_LIST_ENTITY: &str = "source_list_entity";
pub const CONF_VOLUME_STEP: &str = "volume_step";

// Media information
pub const CONF_MEDIA_TITLE_ENTITY: &str = "media_title_entity";
pub const CONF_MEDIA_ARTIST_ENTITY: &str = "media_artist_entity";
pub const CONF_MEDIA_ALBUM_ENTITY: &str = "media_album_entity";
pub const CONF_MEDIA_IMAGE_ENTITY: &str = "media_image_entity";
pub const CONF_MEDIA_POSITION_ENTITY: &str = "media_position_entity";
pub const CONF_MEDIA_DURATION_ENTITY: &str = "media_duration_entity";
pub const CONF_MEDIA_ALBUM_ARTIST_ENTITY: &str = "media_album_artist_entity";
pub const CONF_MEDIA_TRACK_ENTITY: &str = "media_track_entity";
pub const CONF_MEDIA_SERIES_TITLE_ENTITY: &str = "media_series_title_entity";
pub const CONF_MEDIA_SEASON_ENTITY: &str = "media_season_entity";
pub const CONF_MEDIA_EPISODE_ENTITY: &str = "media_episode_entity";
pub const CONF_MEDIA_CHANNEL_ENTITY: &str = "media_channel_entity";
pub const CONF_MEDIA_PLAYLIST_ENTITY: &str = "media_playlist_entity";

// Advanced state
pub const CONF_SOUND_MODE_ENTITY: &str = "sound_mode_entity";
pub const CONF_SOUND_MODE_LIST_ENTITY: &str = "sound_mode_list_entity";
pub const CONF_APP_ID_ENTITY: &str = "app_id_entity";
pub const CONF_APP_NAME_ENTITY: &str = "app_name_entity";
pub const CONF_GROUP_MEMBERS_ENTITY: &str = "group_members_entity";
pub const CONF_REPEAT_STATE_ENTITY: &str = "repeat_state_entity";
pub const CONF_SHUFFLE_STATE_ENTITY: &str = "shuffle_state_entity";

// Actions, stored under options["actions"]
pub const CONF_ACTIONS: &str = "actions";
pub const CONF_PLAY_ACTION: &str = "play_action";
pub const CONF_PAUSE_ACTION: &str = "pause_action";
pub const CONF_STOP_ACTION: &str = "stop_action";
pub const CONF_NEXT_ACTION: &str = "next_action";
pub const CONF_PREVIOUS_ACTION: &str = "previous_action";
pub const CONF_TOGGLE_ACTION: &str = "toggle_action";
pub const CONF_PLAY_PAUSE_ACTION: &str = "play_pause_action";
pub const CONF_SEEK_ACTION: &str = "seek_action";
pub const CONF_PLAY_MEDIA_ACTION: &str = "play_media_action";
pub const CONF_CLEAR_PLAYLIST_ACTION: &str = "clear_playlist_action";
pub const CONF_SHUFFLE_SET_ACTION: &str = "shuffle_set_action";
pub const CONF_REPEAT_SET_ACTION: &str = "repeat_set_action";
pub const CONF_SELECT_SOUND_MODE_ACTION: &str = "select_sound_mode_action";
pub const CONF_OPEN_ACTION: &str = "open_action";
pub const CONF_CLOSE_ACTION: &str = "close_action";

pub const BASIC_ENTITY_KEYS: [&str; 6] = [
    CONF_POWER_ENTITY,
    CONF_PLAYER_STATE_ENTITY,
    CONF_VOLUME_ENTITY,
    CONF_MUTE_ENTITY,
    CONF_SOURCE_ENTITY,
    CONF_SOURCE_LIST_ENTITY,
];

pub const MEDIA_INFO_ENTITY_KEYS: [&str; 13] = [
    CONF_MEDIA_TITLE_ENTITY,
    CONF_MEDIA_ARTIST_ENTITY,
    CONF_MEDIA_ALBUM_ENTITY,
    CONF_MEDIA_IMAGE_ENTITY,
    CONF_MEDIA_POSITION_ENTITY,
    CONF_MEDIA_DURATION_ENTITY,
    CONF_MEDIA_ALBUM_ARTIST_ENTITY,
    CONF_MEDIA_TRACK_ENTITY,
    CONF_MEDIA_SERIES_TITLE_ENTITY,
    CONF_MEDIA_SEASON_ENTITY,
    CONF_MEDIA_EPISODE_ENTITY,
    CONF_MEDIA_CHANNEL_ENTITY,
    CONF_MEDIA_PLAYLIST_ENTITY,
];

pub const ADVANCED_STATE_ENTITY_KEYS: [&str; 7] = [
    CONF_SOUND_MODE_ENTITY,
    CONF_SOUND_MODE_LIST_ENTITY,
    CONF_APP_ID_ENTITY,
    CONF_APP_NAME_ENTITY,
    CONF_GROUP_MEMBERS_ENTITY,
    CONF_REPEAT_STATE_ENTITY,
    CONF_SHUFFLE_STATE_ENTITY,
];

pub const PLAYBACK_ACTION_KEYS: [&str; 9] = [
    CONF_PLAY_ACTION,
    CONF_PAUSE_ACTION,
    CONF_STOP_ACTION,
    CONF_NEXT_ACTION,
    CONF_PREVIOUS_ACTION,
    CONF_TOGGLE_ACTION,
    CONF_PLAY_PAUSE_ACTION,
    CONF_SEEK_ACTION,
    CONF_PLAY_MEDIA_ACTION,
];

pub const OTHER_ACTION_KEYS: [&str; 6] = [
    CONF_CLEAR_PLAYLIST_ACTION,
    CONF_SHUFFLE_SET_ACTION,
    CONF_REPEAT_SET_ACTION,
    CONF_SELECT_SOUND_MODE_ACTION,
    CONF_OPEN_ACTION,
    CONF_CLOSE_ACTION,
];

/// Every entity role, in form order
pub fn entity_keys() -> impl Iterator<Item = &'static str> {
    BASIC_ENTITY_KEYS
        .into_iter()
        .chain(MEDIA_INFO_ENTITY_KEYS)
        .chain(ADVANCED_STATE_ENTITY_KEYS)
}

/// Every action key, in form order
pub fn action_keys() -> impl Iterator<Item = &'static str> {
    PLAYBACK_ACTION_KEYS.into_iter().chain(OTHER_ACTION_KEYS)
}

/// Domains an entity picker for `key` offers
pub fn entity_domains(key: &str) -> &'static [&'static str] {
    match key {
        CONF_POWER_ENTITY | CONF_MUTE_ENTITY => &["switch", "input_boolean"],
        CONF_PLAYER_STATE_ENTITY => &["sensor", "input_select"],
        CONF_VOLUME_ENTITY => &["input_number", "number"],
        CONF_SOURCE_ENTITY => &["input_select", "select"],
        CONF_MEDIA_IMAGE_ENTITY => &["image"],
        CONF_MEDIA_POSITION_ENTITY | CONF_MEDIA_DURATION_ENTITY => &["sensor", "input_number"],
        CONF_MEDIA_TRACK_ENTITY | CONF_MEDIA_SEASON_ENTITY | CONF_MEDIA_EPISODE_ENTITY => {
            &["sensor", "input_text", "input_number"]
        }
        CONF_SOUND_MODE_ENTITY => &["input_select", "select", "sensor"],
        CONF_GROUP_MEMBERS_ENTITY => &["sensor"],
        CONF_REPEAT_STATE_ENTITY => &["sensor", "input_select"],
        CONF_SHUFFLE_STATE_ENTITY => &["sensor", "input_boolean", "switch"],
        _ => &["sensor", "input_text"],
    }
}
